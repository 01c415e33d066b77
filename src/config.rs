use std::{collections::BTreeMap, path::PathBuf};

use clap::{Parser, ValueEnum};

pub const DEFAULT_MAX_FRAME_DEPTH: usize = 4096;
pub const ENV_OPTION_VARIABLES: [&str; 3] = ["JAVA_TOOL_OPTIONS", "_JAVA_OPTIONS", "JDK_JAVA_OPTIONS"];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum Verbosity {
    #[default]
    Quiet,
    /// class loading
    Class,
    /// everything the VM logs
    Finest,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum VmModel {
    Client,
    #[default]
    Server,
}

#[derive(Parser, Debug)]
#[command(name = "java", about = "Runs a Java class", disable_version_flag = true)]
struct Cli {
    /// class search path of directories and jar/zip/jmod files
    #[arg(long = "class-path", value_name = "PATH")]
    class_path: Option<String>,

    #[arg(long, value_enum, num_args = 0..=1, default_missing_value = "class")]
    verbose: Option<Verbosity>,

    #[arg(long, value_enum)]
    vm: Option<VmModel>,

    #[arg(long)]
    enable_assertions: bool,

    #[arg(long)]
    disable_assertions: bool,

    /// system property, `name=value`
    #[arg(long = "define", value_name = "NAME=VALUE")]
    properties: Vec<String>,

    #[arg(long)]
    max_frame_depth: Option<usize>,

    #[arg(long)]
    show_version: bool,

    main_class: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Resolved VM configuration.
#[derive(Debug, Clone)]
pub struct VmOptions {
    pub class_path: Vec<PathBuf>,
    pub verbose: Verbosity,
    pub vm_model: VmModel,
    pub assertions: bool,
    pub properties: BTreeMap<String, String>,
    pub max_frame_depth: usize,
    pub main_class: Option<String>,
    pub args: Vec<String>,
    pub show_version: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        VmOptions {
            class_path: vec![PathBuf::from(".")],
            verbose: Verbosity::Quiet,
            vm_model: VmModel::Server,
            assertions: false,
            properties: BTreeMap::new(),
            max_frame_depth: DEFAULT_MAX_FRAME_DEPTH,
            main_class: None,
            args: Vec::new(),
            show_version: false,
        }
    }
}

/// Splits a class path on the platform separators (`:` and `;` are both accepted).
pub fn split_class_path(path: &str) -> Vec<PathBuf> {
    path.split([':', ';'])
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// `argv` with the environment options spliced in after the program name.
pub fn effective_args(argv: Vec<String>, env: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let mut argv = argv.into_iter();
    let mut result: Vec<String> = argv.next().into_iter().collect();
    for variable in ENV_OPTION_VARIABLES {
        if let Some(value) = env(variable) {
            result.extend(value.split_whitespace().map(str::to_string));
        }
    }
    result.extend(argv);
    result
}

/// Rewrites Java-style flags; everything after the main class is left alone.
fn normalize(args: Vec<String>) -> Vec<String> {
    let mut args = args.into_iter();
    let mut result: Vec<String> = args.next().into_iter().collect();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-cp" | "-classpath" | "--class-path" => {
                result.push("--class-path".to_string());
                if let Some(path) = args.next() {
                    result.push(path);
                }
            }
            "-verbose" | "-verbose:class" => result.push("--verbose=class".to_string()),
            "-verbose:finest" => result.push("--verbose=finest".to_string()),
            "-client" => result.push("--vm=client".to_string()),
            "-server" => result.push("--vm=server".to_string()),
            "-version" | "--version" => result.push("--show-version".to_string()),
            "-ea" | "-enableassertions" => result.push("--enable-assertions".to_string()),
            "-da" | "-disableassertions" => result.push("--disable-assertions".to_string()),
            flag if flag.starts_with("-ea:") || flag.starts_with("-enableassertions:") => {
                result.push("--enable-assertions".to_string())
            }
            flag if flag.starts_with("-da:") || flag.starts_with("-disableassertions:") => {
                result.push("--disable-assertions".to_string())
            }
            flag if flag.starts_with("-verbose:") => {
                log::warn!("ignoring unsupported option {flag}");
            }
            flag if flag.starts_with("-D") => {
                result.push("--define".to_string());
                result.push(flag[2..].to_string());
            }
            flag if flag.starts_with("-Xss") || flag.starts_with("-X") => {
                log::warn!("ignoring unsupported option {flag}");
            }
            flag if flag.starts_with("--") => result.push(arg),
            flag if flag.starts_with('-') => {
                // unknown single-dash flags are reported by clap
                result.push(format!("-{flag}"));
            }
            _ => {
                result.push("--".to_string());
                result.push(arg);
                result.extend(args);
                break;
            }
        }
    }
    result
}

impl VmOptions {
    /// Parses a full `java` command line (program name first).
    pub fn from_args(args: Vec<String>, class_path_env: Option<String>) -> Result<Self, clap::Error> {
        let cli = Cli::try_parse_from(normalize(args))?;

        let class_path = match cli.class_path.or(class_path_env) {
            Some(path) => split_class_path(&path),
            None => vec![PathBuf::from(".")],
        };
        let mut properties = BTreeMap::new();
        for property in cli.properties {
            let (name, value) = property.split_once('=').unwrap_or((&property, ""));
            properties.insert(name.to_string(), value.to_string());
        }

        Ok(VmOptions {
            class_path,
            verbose: cli.verbose.unwrap_or_default(),
            vm_model: cli.vm.unwrap_or_default(),
            assertions: cli.enable_assertions && !cli.disable_assertions,
            properties,
            max_frame_depth: cli.max_frame_depth.unwrap_or(DEFAULT_MAX_FRAME_DEPTH),
            main_class: cli.main_class,
            args: cli.args,
            show_version: cli.show_version,
        })
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            Verbosity::Quiet => log::LevelFilter::Warn,
            Verbosity::Class => log::LevelFilter::Info,
            Verbosity::Finest => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_java_style_flags() {
        let options = VmOptions::from_args(
            args("java -cp a:b;c -verbose:finest -client -ea -Dx=1 -Dflag Main one -two"),
            None,
        )
        .unwrap();
        assert_eq!(
            options.class_path,
            [PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
        assert_eq!(options.verbose, Verbosity::Finest);
        assert_eq!(options.vm_model, VmModel::Client);
        assert!(options.assertions);
        assert_eq!(options.properties["x"], "1");
        assert_eq!(options.properties["flag"], "");
        assert_eq!(options.main_class.as_deref(), Some("Main"));
        assert_eq!(options.args, ["one", "-two"]);
        assert_eq!(options.log_level(), log::LevelFilter::Trace);
    }

    #[test]
    fn test_defaults() {
        let options = VmOptions::from_args(args("java -verbose -Xss4m Main"), None).unwrap();
        assert_eq!(options.class_path, [PathBuf::from(".")]);
        assert_eq!(options.verbose, Verbosity::Class);
        assert_eq!(options.max_frame_depth, DEFAULT_MAX_FRAME_DEPTH);
        assert!(!options.assertions);

        let options = VmOptions::from_args(args("java Main"), Some("lib".into())).unwrap();
        assert_eq!(options.class_path, [PathBuf::from("lib")]);
        assert_eq!(options.verbose, Verbosity::Quiet);
    }

    #[test]
    fn test_environment_options_come_first() {
        let argv = effective_args(args("java Main"), |name| match name {
            "JAVA_TOOL_OPTIONS" => Some("-ea".into()),
            "JDK_JAVA_OPTIONS" => Some("-Da=b  -client".into()),
            _ => None,
        });
        assert_eq!(argv, ["java", "-ea", "-Da=b", "-client", "Main"]);
    }

    #[test]
    fn test_unknown_flag_is_an_error() {
        assert!(VmOptions::from_args(args("java -bogus Main"), None).is_err());
    }
}
