fn main() {
    // HACK disable the default of re-running the build script on *any*
    // change to *the entire source tree* (i.e. the default is roughly `./`).
    println!("cargo:rerun-if-changed=build.rs");

    let grammar_dir = std::path::PathBuf::from(std::env::var_os("CARGO_MANIFEST_DIR").unwrap())
        .join("grammar");
    println!("cargo:rerun-if-changed={}", grammar_dir.display());

    let core_grammar = grammar_dir.join("spirv.core.grammar.json");
    if !std::fs::metadata(&core_grammar).is_ok_and(|m| m.is_file()) {
        eprintln!(" error: {} is not a file", core_grammar.display());
        eprintln!("  help: the grammar tables ship with the crate, under `grammar/`");
        eprintln!("  note: if the error persists, please open an issue");
        std::process::exit(1);
    }

    std::fs::write(
        std::path::PathBuf::from(std::env::var_os("OUT_DIR").unwrap())
            .join("khr_spv_grammar_jsons.rs"),
        format!("pub(super) const SPIRV_CORE_GRAMMAR: &str = include_str!({core_grammar:?});\n"),
    )
    .unwrap();
}
