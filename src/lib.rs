//! SPIR-V binary validation, driven by the Khronos grammar tables.
//!
//! A module is validated in stages, each of which must succeed before the
//! next one runs:
//! 1. the header is decoded (and its version checked against the environment)
//! 2. instructions are decoded, against the grammar's operand layouts
//! 3. module-wide tables are built ([`module::Module`]): logical layout,
//!    ID definitions, types, decorations, functions and their blocks
//! 4. rule groups ([`val`]) check every instruction, with opcodes and
//!    enumerants gated by [`gate::Gate`] on capabilities/extensions/versions
//!
//! ```no_run
//! use spirv_val::{env::TargetEnv, options::ValidatorOptions};
//!
//! let bytes = std::fs::read("shader.spv").unwrap();
//! match spirv_val::validate_bytes(&bytes, TargetEnv::Vulkan1_1, &ValidatorOptions::default()) {
//!     Ok(()) => {}
//!     Err(diag) => eprintln!("{:?}: {diag}", diag.kind),
//! }
//! ```

use std::hash::BuildHasherDefault;
use std::ops::ControlFlow;

pub mod diag;
pub mod env;
pub mod gate;
pub mod module;
pub mod options;
pub mod spv;
pub mod val;

pub use diag::{Diag, ErrorKind, Report};
pub use env::TargetEnv;
pub use options::ValidatorOptions;

pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;
pub type FxIndexSet<V> = indexmap::IndexSet<V, BuildHasherDefault<rustc_hash::FxHasher>>;

/// Validate a module given as SPIR-V words, stopping at the first error
/// (unless `options.exhaustive`, in which case the first of all errors is returned).
pub fn validate(words: &[u32], env: TargetEnv, options: &ValidatorOptions) -> Result<(), Diag> {
    Validator::new(env, options.clone()).validate_words(words).into_result()
}

/// Like [`validate`], but for the raw bytes of a `.spv` file (of either endianness).
pub fn validate_bytes(bytes: &[u8], env: TargetEnv, options: &ValidatorOptions) -> Result<(), Diag> {
    Validator::new(env, options.clone()).validate_bytes(bytes).into_result()
}

/// Reusable validator configuration, producing a full [`Report`] per module.
#[derive(Clone, Debug)]
pub struct Validator {
    env: TargetEnv,
    options: ValidatorOptions,
}

impl Validator {
    pub fn new(env: TargetEnv, options: ValidatorOptions) -> Self {
        Self { env, options }
    }

    pub fn env(&self) -> TargetEnv {
        self.env
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    pub fn validate_bytes(&self, bytes: &[u8]) -> Report {
        match spv::read::words_from_bytes(bytes) {
            Ok(words) => self.validate_words(&words),
            Err(diag) => Report { diags: vec![diag] },
        }
    }

    pub fn validate_words(&self, words: &[u32]) -> Report {
        let _span =
            tracing::debug_span!("validate", env = %self.env, words = words.len()).entered();

        let mut sink = diag::DiagSink::new(self.options.exhaustive);
        if let Err(diag) = self.validate_into(words, &mut sink) {
            sink.fail(diag);
        }
        let report = sink.finish();
        tracing::debug!(status = ?report.status(), errors = report.diags.len(), "validated");
        report
    }

    /// Run every stage, with rule diagnostics going into `sink`, and decoding
    /// or table-building failures (after which nothing else can run) returned.
    fn validate_into(&self, words: &[u32], sink: &mut diag::DiagSink) -> Result<(), Diag> {
        let (header, words) = spv::read::decode_header(words.into())?;

        let max_version = self.env.spirv_version();
        if header.version > max_version {
            return Err(Diag::wrong_version(format!(
                "Invalid SPIR-V binary version {} for target environment {}.",
                header.version,
                self.env.description()
            )));
        }

        let insts = spv::read::decode_instructions(&words[spv::spec::HEADER_LEN..])?;
        tracing::debug!(version = %header.version, insts = insts.len(), "decoded");

        let header_version = header.version;
        let module = module::Module::build(header, insts, &self.options.universal_limits)?;

        let version = self.options.override_version.unwrap_or(header_version);
        let gate = gate::Gate::new(&module, self.env, version);
        let cx = val::RuleCx::new(&module, &gate, &self.options);
        if let ControlFlow::Break(()) = val::run(&cx, sink) {
            tracing::debug!("stopped at the first failing rule");
        }
        Ok(())
    }
}
