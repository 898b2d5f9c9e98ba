//! The opaque task payload. The scheduler never inspects `function`/`args`/
//! `kwargs` beyond their byte length (for logging); execution happens entirely
//! on the worker side, which is an external collaborator.

/// A call spec as it would be written by a task-graph-building client, before
/// it is split into the three opaque byte fields the scheduler stores. Only
/// `dumps_task` below interprets this; once a `Payload` exists, the scheduler
/// forgets the call spec ever existed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallSpec {
    /// `(apply, f, args)` or `(apply, f, args, kwargs)`.
    Apply {
        function: Vec<u8>,
        args: Vec<u8>,
        kwargs: Option<Vec<u8>>,
    },
    /// Any other call tuple: stored whole, under `function`.
    Other(Vec<u8>),
}

/// `{function, args, kwargs?}`, each an opaque serialized blob.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Payload {
    pub function: Vec<u8>,
    pub args: Vec<u8>,
    pub kwargs: Option<Vec<u8>>,
}

impl Payload {
    /// Total size, used only for diagnostics -- never to interpret contents.
    pub fn byte_len(&self) -> usize {
        self.function.len() + self.args.len() + self.kwargs.as_ref().map_or(0, Vec::len)
    }
}

/// Split a call spec into the `{function, args, kwargs?}` triple the
/// scheduler stores. Mirrors `dumps_task` from the source: `apply` calls
/// split their pieces out, anything else is stored whole as `function`.
pub fn dumps_task(spec: CallSpec) -> Payload {
    match spec {
        CallSpec::Apply {
            function,
            args,
            kwargs,
        } => Payload {
            function,
            args,
            kwargs,
        },
        CallSpec::Other(tuple) => Payload {
            function: tuple,
            args: Vec::new(),
            kwargs: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_spec_splits_fields() {
        let p = dumps_task(CallSpec::Apply {
            function: b"inc".to_vec(),
            args: b"(1,)".to_vec(),
            kwargs: None,
        });
        assert_eq!(p.function, b"inc");
        assert_eq!(p.args, b"(1,)");
        assert!(p.kwargs.is_none());
    }

    #[test]
    fn other_spec_is_stored_whole() {
        let p = dumps_task(CallSpec::Other(b"1".to_vec()));
        assert_eq!(p.function, b"1");
        assert!(p.args.is_empty());
    }
}
