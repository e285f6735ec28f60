use spirv_val::{TargetEnv, Validator, ValidatorOptions};

fn main() -> std::io::Result<()> {
    let args = std::env::args().collect::<Vec<_>>();
    let (env, options_file, in_file) = match &args[..] {
        [_, in_file] => (TargetEnv::Universal(spirv_val::spv::Version::new(1, 6)), None, in_file),
        [_, env, in_file] => (parse_env(env), None, in_file),
        [_, env, options_file, in_file] => (parse_env(env), Some(options_file), in_file),
        _ => {
            eprintln!("Usage: {} [TARGET_ENV [OPTIONS_JSON]] IN", args[0]);
            eprintln!("  TARGET_ENV: one of {}", {
                let names: Vec<_> = TargetEnv::ALL_NAMED.iter().map(|env| env.to_string()).collect();
                names.join(", ")
            });
            std::process::exit(1);
        }
    };

    let options = match options_file {
        Some(path) => ValidatorOptions::from_json(&std::fs::read_to_string(path)?)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
        None => ValidatorOptions::default(),
    };

    let report = Validator::new(env, options).validate_bytes(&std::fs::read(in_file)?);
    for diag in &report.diags {
        match diag.inst_idx {
            Some(idx) => eprintln!("error: {in_file}: instruction #{idx}: {diag}"),
            None => eprintln!("error: {in_file}: {diag}"),
        }
    }
    if !report.diags.is_empty() {
        eprintln!("{:?}", report.status());
        std::process::exit(1);
    }
    Ok(())
}

fn parse_env(name: &str) -> TargetEnv {
    name.parse().unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    })
}
