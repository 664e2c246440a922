use crate::mock::RecordingHost;
use crate::{
    initial_state, resolve, GlobalOptions, Host, MetaNamer, Mode, Phase, PropertyOptions,
    ResolutionState, Watch,
};
use serde_json::{json, Value};

fn options() -> PropertyOptions<RecordingHost> {
    PropertyOptions::new()
        .get(|_: &RecordingHost| json!(1))
        .default_value(json!([]))
        .watch(Watch::field("q"))
}

#[test]
fn test_initial_state_for_data() {
    let descriptor = resolve("users", Mode::Data, &options(), &GlobalOptions::new()).unwrap();
    let fields = initial_state(&descriptor, &MetaNamer::default());
    assert_eq!(
        fields,
        vec![
            ("users".to_string(), json!([])),
            ("users$loading".to_string(), json!(false)),
            ("users$error".to_string(), Value::Null),
            ("users$default".to_string(), json!([])),
        ]
    );
}

#[test]
fn test_initial_state_for_computed_has_pending() {
    let descriptor = resolve("hits", Mode::Computed, &options(), &GlobalOptions::new()).unwrap();
    let fields = initial_state(&descriptor, &MetaNamer::default());
    assert!(fields.contains(&("hits$pending".to_string(), json!(false))));
    assert_eq!(fields.len(), 5);
}

#[test]
fn test_initial_state_for_method() {
    let descriptor = resolve("save", Mode::Method, &options(), &GlobalOptions::new()).unwrap();
    let fields = initial_state(&descriptor, &MetaNamer::with_separator("_"));
    assert_eq!(
        fields,
        vec![
            ("save_invocations".to_string(), json!(0)),
            ("save_loading".to_string(), json!(false)),
            ("save_error".to_string(), Value::Null),
        ]
    );
}

#[test]
fn test_read_back_from_host() {
    let host = RecordingHost::new();
    let meta = MetaNamer::default();
    let descriptor = resolve("hits", Mode::Computed, &options(), &GlobalOptions::new()).unwrap();
    host.merge(initial_state(&descriptor, &meta));

    let state = ResolutionState::read(&host, "hits", &meta);
    assert_eq!(state, ResolutionState::initial(json!([])));
    assert_eq!(state.phase(), Phase::Idle);

    host.write("hits$pending", json!(true));
    assert_eq!(ResolutionState::read(&host, "hits", &meta).phase(), Phase::Pending);

    host.write("hits$pending", json!(false));
    host.write("hits$loading", json!(true));
    assert_eq!(ResolutionState::read(&host, "hits", &meta).phase(), Phase::Loading);

    host.write("hits$loading", json!(false));
    host.write("hits$error", json!("timeout"));
    let state = ResolutionState::read(&host, "hits", &meta);
    assert!(state.is_idle());
    assert!(state.has_error());
    assert_eq!(state.error.as_deref(), Some("timeout"));
}

#[test]
fn test_default_snapshot_is_independent_of_value() {
    let host = RecordingHost::new();
    let meta = MetaNamer::default();
    let descriptor = resolve("users", Mode::Data, &options(), &GlobalOptions::new()).unwrap();
    host.merge(initial_state(&descriptor, &meta));

    host.write("users", json!(["ann"]));
    let state = ResolutionState::read(&host, "users", &meta);
    assert_eq!(state.value, json!(["ann"]));
    assert_eq!(state.default_snapshot, json!([]));
}
