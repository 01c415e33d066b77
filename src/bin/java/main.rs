use std::{env, process};

use cafevm::{
    config::{self, VmOptions},
    runtime::vm,
};

fn main() {
    let argv = config::effective_args(env::args().collect(), |name| env::var(name).ok());
    let options = match VmOptions::from_args(argv, env::var("CLASSPATH").ok()) {
        Ok(options) => options,
        Err(err) => err.exit(),
    };

    env_logger::Builder::new()
        .filter_level(options.log_level())
        .parse_env("RUST_LOG")
        .init();

    if options.show_version {
        eprint!("{}", vm::version_text());
        if options.main_class.is_none() {
            return;
        }
    }

    let code = match vm::run(options) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            1
        }
    };
    process::exit(code);
}
