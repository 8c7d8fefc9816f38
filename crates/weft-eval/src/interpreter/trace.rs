//! Execution trace recording.
//!
//! When [`InterpreterConfig::trace_enabled`](super::InterpreterConfig) is
//! set, the interpreter records one [`TraceEntry`] per evaluated node, in
//! completion order (children before their parent).

use serde::Serialize;

use weft_core::id::{ExecNodeId, UnitId};
use weft_core::signal::ControlSignal;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub unit: UnitId,
    pub node: ExecNodeId,
    /// Human-readable description of the op.
    pub op: String,
    /// Call depth at the time of evaluation.
    pub depth: usize,
    /// Kind of signal the node produced.
    pub signal: &'static str,
    /// Rendered value for `normal` and `return` signals.
    pub value: Option<String>,
}

impl TraceEntry {
    pub(crate) fn record(unit: UnitId, node: ExecNodeId, op: String, depth: usize, signal: &ControlSignal) -> Self {
        let value = match signal {
            ControlSignal::Normal(v) | ControlSignal::Return(v) => Some(v.to_string()),
            ControlSignal::Raised(raised) => Some(raised.exception.to_string()),
            ControlSignal::Break | ControlSignal::Continue => None,
        };
        TraceEntry {
            unit,
            node,
            op,
            depth,
            signal: signal.kind(),
            value,
        }
    }
}

/// Renders entries as JSON lines, one entry per line.
pub fn to_json_lines(entries: &[TraceEntry]) -> serde_json::Result<String> {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&serde_json::to_string(entry)?);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::value::Value;

    #[test]
    fn entries_serialize_one_per_line() {
        let entry = TraceEntry::record(
            UnitId(0),
            ExecNodeId(3),
            "literal 1".into(),
            1,
            &ControlSignal::Normal(Value::Int(1)),
        );
        let lines = to_json_lines(&[entry.clone(), entry]).unwrap();
        assert_eq!(lines.lines().count(), 2);
        insta::assert_snapshot!(lines.lines().next().unwrap(), @r#"{"unit":0,"node":3,"op":"literal 1","depth":1,"signal":"normal","value":"1"}"#);
    }
}
