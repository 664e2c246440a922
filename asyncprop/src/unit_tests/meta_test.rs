use crate::{MetaNamer, MetaRole};

#[test]
fn test_default_rule_uses_dollar_separator() {
    let meta = MetaNamer::default();
    assert_eq!(meta.derive("users", MetaRole::Loading), "users$loading");
    assert_eq!(meta.derive("users", MetaRole::Refresh), "users$refresh");
    assert_eq!(meta.derive("users", MetaRole::Invocations), "users$invocations");
}

#[test]
fn test_default_rule_keeps_roles_apart() {
    let meta = MetaNamer::default();
    let roles = [
        MetaRole::Refresh,
        MetaRole::Loading,
        MetaRole::Pending,
        MetaRole::Error,
        MetaRole::Default,
        MetaRole::Cancel,
        MetaRole::Now,
        MetaRole::More,
        MetaRole::Reset,
        MetaRole::Debounce,
        MetaRole::Invocations,
    ];
    let mut names: Vec<String> = roles
        .iter()
        .flat_map(|role| [meta.derive("a", *role), meta.derive("b", *role)])
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), roles.len() * 2);
}

#[test]
fn test_custom_separator() {
    let meta = MetaNamer::with_separator("__");
    assert_eq!(meta.derive("feed", MetaRole::More), "feed__more");
}

#[test]
fn test_custom_rule() {
    let meta = MetaNamer::custom(|prop, role| {
        let mut role = role.to_string();
        if let Some(first) = role.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        format!("{prop}{role}")
    });
    assert_eq!(meta.derive("feed", MetaRole::Loading), "feedLoading");
    assert_eq!(meta.derive("feed", MetaRole::Now), "feedNow");
}

#[test]
fn test_role_display() {
    assert_eq!(MetaRole::Pending.to_string(), "pending");
    assert_eq!(MetaRole::Default.as_str(), "default");
}
