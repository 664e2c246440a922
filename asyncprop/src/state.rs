use crate::{Host, MetaNamer, MetaRole, Mode, PropertyDescriptor};
use serde_json::Value;

/// Where a property sits in its `Idle -> Pending -> Loading -> Idle` cycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Phase {
    Idle,
    Pending,
    Loading,
}

/// A snapshot of one property's runtime state as stored on its host.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolutionState {
    pub value: Value,
    pub loading: bool,
    pub pending: bool,
    pub error: Option<String>,
    pub default_snapshot: Value,
    /// Outstanding calls; only method properties count them.
    pub invocations: u64,
}

impl ResolutionState {
    pub fn initial(default_value: Value) -> Self {
        ResolutionState {
            value: default_value.clone(),
            loading: false,
            pending: false,
            error: None,
            default_snapshot: default_value,
            invocations: 0,
        }
    }

    /// Reads the companion fields of `name` back from `host`.
    pub fn read<H: Host>(host: &H, name: &str, meta: &MetaNamer) -> Self {
        let flag = |role| host.read(&meta.derive(name, role)).as_bool().unwrap_or(false);
        ResolutionState {
            value: host.read(name),
            loading: flag(MetaRole::Loading),
            pending: flag(MetaRole::Pending),
            error: match host.read(&meta.derive(name, MetaRole::Error)) {
                Value::Null => None,
                Value::String(message) => Some(message),
                other => Some(other.to_string()),
            },
            default_snapshot: host.read(&meta.derive(name, MetaRole::Default)),
            invocations: host
                .read(&meta.derive(name, MetaRole::Invocations))
                .as_u64()
                .unwrap_or(0),
        }
    }

    pub fn phase(&self) -> Phase {
        if self.loading {
            Phase::Loading
        } else if self.pending {
            Phase::Pending
        } else {
            Phase::Idle
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == Phase::Idle
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The fields a host must start with for one property.
///
/// Data and computed properties get the value, loading, error and default
/// fields (plus pending for computed). Methods keep no value: they get an
/// invocation counter, a derived loading flag and an error field.
pub fn initial_state<H>(descriptor: &PropertyDescriptor<H>, meta: &MetaNamer) -> Vec<(String, Value)> {
    let name = descriptor.name.as_str();
    let default_value = descriptor.default_value.clone();
    let mut fields = Vec::with_capacity(5);

    match descriptor.mode {
        Mode::Data | Mode::Computed => {
            fields.push((name.to_string(), default_value.clone()));
            fields.push((meta.derive(name, MetaRole::Loading), Value::Bool(false)));
            if descriptor.mode == Mode::Computed {
                fields.push((meta.derive(name, MetaRole::Pending), Value::Bool(false)));
            }
            fields.push((meta.derive(name, MetaRole::Error), Value::Null));
            fields.push((meta.derive(name, MetaRole::Default), default_value));
        }
        Mode::Method => {
            fields.push((meta.derive(name, MetaRole::Invocations), Value::from(0u64)));
            fields.push((meta.derive(name, MetaRole::Loading), Value::Bool(false)));
            fields.push((meta.derive(name, MetaRole::Error), Value::Null));
        }
    }
    fields
}
