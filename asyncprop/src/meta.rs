use std::fmt;
use std::sync::Arc;

/// The companion slots derived from a property name.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MetaRole {
    Refresh,
    Loading,
    Pending,
    Error,
    Default,
    Cancel,
    Now,
    More,
    Reset,
    Debounce,
    Invocations,
}

impl MetaRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaRole::Refresh => "refresh",
            MetaRole::Loading => "loading",
            MetaRole::Pending => "pending",
            MetaRole::Error => "error",
            MetaRole::Default => "default",
            MetaRole::Cancel => "cancel",
            MetaRole::Now => "now",
            MetaRole::More => "more",
            MetaRole::Reset => "reset",
            MetaRole::Debounce => "debounce",
            MetaRole::Invocations => "invocations",
        }
    }
}

impl fmt::Display for MetaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a property name and a role to the key of a companion field or action.
///
/// The default rule is `"{prop}${role}"`, which never collides for distinct
/// pairs. Custom rules are trusted as given: keeping them collision free is
/// up to whoever supplies them.
#[derive(Clone)]
pub struct MetaNamer {
    rule: Arc<dyn Fn(&str, &str) -> String + Send + Sync>,
}

impl MetaNamer {
    pub fn with_separator(separator: impl Into<String>) -> Self {
        let separator = separator.into();
        Self::custom(move |prop, role| format!("{prop}{separator}{role}"))
    }

    pub fn custom<F>(rule: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        MetaNamer {
            rule: Arc::new(rule),
        }
    }

    pub fn derive(&self, prop: &str, role: MetaRole) -> String {
        (self.rule)(prop, role.as_str())
    }
}

impl Default for MetaNamer {
    fn default() -> Self {
        Self::with_separator("$")
    }
}

impl fmt::Debug for MetaNamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaNamer")
            .field("sample", &self.derive("prop", MetaRole::Loading))
            .finish()
    }
}
