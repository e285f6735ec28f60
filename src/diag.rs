//! Validation results: status kinds, diagnostics and the sink collecting them.

use crate::spv;
use std::fmt;
use std::ops::ControlFlow;

/// Validation status, one per failure family (plus `Success`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    #[error("success")]
    Success,

    /// Malformed container: bad header, truncated or overlong instructions, etc.
    #[error("invalid binary")]
    InvalidBinary,

    /// An ID operand is missing, of the wrong kind, or used before its definition.
    #[error("invalid ID")]
    InvalidId,

    /// A well-formed instruction breaking a semantic rule.
    #[error("invalid data")]
    InvalidData,

    /// An opcode or enumerant not enabled by any declared capability/extension.
    #[error("invalid capability")]
    InvalidCapability,

    /// Not available in the active SPIR-V version.
    #[error("wrong version")]
    WrongVersion,

    #[error("unsupported")]
    Unsupported,

    /// A configured universal limit was exceeded.
    #[error("out of resources")]
    OutOfResources,
}

/// A single validation failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diag {
    pub kind: ErrorKind,
    pub message: String,

    /// The offending ID, if any.
    pub id: Option<spv::Id>,

    /// Index (in module order) of the offending instruction, if any.
    pub inst_idx: Option<usize>,

    /// External rule citation (e.g. `VUID-StandaloneSpirv-None-04636`), kept opaque.
    pub vuid: Option<&'static str>,
}

impl Diag {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), id: None, inst_idx: None, vuid: None }
    }

    pub fn invalid_binary(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidBinary, message)
    }

    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidId, message)
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidData, message)
    }

    pub fn invalid_capability(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCapability, message)
    }

    pub fn wrong_version(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WrongVersion, message)
    }

    pub fn with_id(mut self, id: spv::Id) -> Self {
        self.id = Some(id);
        self
    }

    /// Attach the instruction position, unless a more specific one was already set.
    pub fn at_inst(mut self, inst_idx: usize) -> Self {
        self.inst_idx.get_or_insert(inst_idx);
        self
    }

    pub fn with_vuid(mut self, vuid: &'static str) -> Self {
        self.vuid = Some(vuid);
        self
    }
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(vuid) = self.vuid {
            write!(f, "[{vuid}] ")?;
        }
        f.write_str(&self.message)
    }
}

impl std::error::Error for Diag {}

/// Collects diagnostics, either stopping at the first one (the default), or
/// accumulating all of them in order (exhaustive mode).
pub struct DiagSink {
    exhaustive: bool,
    diags: Vec<Diag>,
}

impl DiagSink {
    pub fn new(exhaustive: bool) -> Self {
        Self { exhaustive, diags: vec![] }
    }

    /// Record `diag`, and signal whether validation should stop.
    pub fn report(&mut self, diag: Diag) -> ControlFlow<()> {
        tracing::debug!(kind = ?diag.kind, inst_idx = ?diag.inst_idx, "{diag}");
        self.diags.push(diag);
        if self.exhaustive {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }

    /// Convenience for rule results, reporting only errors.
    pub fn check(&mut self, result: Result<(), Diag>) -> ControlFlow<()> {
        match result {
            Ok(()) => ControlFlow::Continue(()),
            Err(diag) => self.report(diag),
        }
    }

    /// Record the failure of a whole stage, after which nothing else runs.
    pub fn fail(&mut self, diag: Diag) {
        tracing::debug!(kind = ?diag.kind, inst_idx = ?diag.inst_idx, "stage failed: {diag}");
        self.diags.push(diag);
    }

    pub fn finish(self) -> Report {
        Report { diags: self.diags }
    }
}

/// Everything reported by one validation call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub diags: Vec<Diag>,
}

impl Report {
    /// The authoritative status: that of the first diagnostic, or `Success`.
    pub fn status(&self) -> ErrorKind {
        self.diags.first().map_or(ErrorKind::Success, |diag| diag.kind)
    }

    pub fn into_result(self) -> Result<(), Diag> {
        match self.diags.into_iter().next() {
            Some(diag) => Err(diag),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_vuid() {
        let diag = Diag::invalid_data("bad scope").with_vuid("VUID-StandaloneSpirv-None-04636");
        assert_eq!(diag.to_string(), "[VUID-StandaloneSpirv-None-04636] bad scope");
        assert_eq!(Diag::invalid_id("missing").to_string(), "missing");
    }

    #[test]
    fn fail_fast_stops_at_first() {
        let mut sink = DiagSink::new(false);
        assert_eq!(sink.report(Diag::invalid_id("a")), ControlFlow::Break(()));
        let report = sink.finish();
        assert_eq!(report.status(), ErrorKind::InvalidId);
        assert_eq!(report.diags.len(), 1);
    }

    #[test]
    fn exhaustive_keeps_order() {
        let mut sink = DiagSink::new(true);
        assert_eq!(sink.check(Err(Diag::invalid_data("first"))), ControlFlow::Continue(()));
        assert_eq!(sink.check(Ok(())), ControlFlow::Continue(()));
        assert_eq!(sink.check(Err(Diag::wrong_version("second"))), ControlFlow::Continue(()));
        let report = sink.finish();
        assert_eq!(report.status(), ErrorKind::InvalidData);
        let messages: Vec<_> = report.diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["first", "second"]);
        assert_eq!(report.into_result().unwrap_err().message, "first");
    }

    #[test]
    fn stage_failure_follows_rule_diagnostics() {
        let mut sink = DiagSink::new(true);
        assert_eq!(sink.report(Diag::invalid_data("rule")), ControlFlow::Continue(()));
        sink.fail(Diag::invalid_binary("stage"));
        let report = sink.finish();
        assert_eq!(report.status(), ErrorKind::InvalidData);
        assert_eq!(report.diags.len(), 2);
        assert_eq!(report.diags[1].kind, ErrorKind::InvalidBinary);
    }

    #[test]
    fn at_inst_keeps_innermost_position() {
        let diag = Diag::invalid_id("x").at_inst(3).at_inst(7);
        assert_eq!(diag.inst_idx, Some(3));
    }
}
