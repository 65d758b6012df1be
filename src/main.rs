use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use monoc::config::{CompileOptions, OptLevel};
use monoc::diagnostics::{render_error, CompileError};
use monoc::program::{Object, Program};

#[derive(Parser)]
#[command(name = "monoc", version, about = "Ahead-of-time compiler for statically typeable bytecode")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Optimization level
    #[arg(long, global = true, value_enum)]
    opt_level: Option<OptLevel>,

    /// Skip the Cranelift verifier
    #[arg(long, global = true)]
    no_verify: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Program image (JSON)
    image: PathBuf,
    /// Entry function, `name` or `module.name`
    #[arg(long, default_value = "main")]
    entry: String,
    /// Entry arguments: integers, floats, true/false
    #[arg(allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the entry point and run it in memory
    Run(Target),
    /// Print the generated IR
    Ir(Target),
    /// Print the inferred types of every reachable function
    Types {
        #[command(flatten)]
        target: Target,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a relocatable object file
    Compile {
        #[command(flatten)]
        target: Target,
        /// Output object path
        #[arg(short, long, default_value = "out.o")]
        output: PathBuf,
        /// Target triple (defaults to the config file, then the host)
        #[arg(long)]
        triple: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();
}

fn parse_arg(text: &str) -> Result<Object, CompileError> {
    match text {
        "true" | "True" => return Ok(Object::Bool(true)),
        "false" | "False" => return Ok(Object::Bool(false)),
        _ => {}
    }
    if let Ok(v) = text.parse::<i64>() {
        return Ok(Object::Int(v));
    }
    text.parse::<f64>()
        .map(Object::Float)
        .map_err(|_| CompileError::io(format!("cannot parse argument `{text}`")))
}

fn format_object(object: &Object) -> String {
    match object {
        Object::Bool(true) => "True".to_string(),
        Object::Bool(false) => "False".to_string(),
        Object::Int(v) => v.to_string(),
        Object::Float(v) if v.is_finite() && v.fract() == 0.0 => format!("{v:.1}"),
        Object::Float(v) => v.to_string(),
        Object::None => "None".to_string(),
        other => format!("{other:?}"),
    }
}

fn options(cli: &Cli, image: &Path) -> Result<CompileOptions, CompileError> {
    let dir = image.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut options = CompileOptions::discover(dir)?;
    if let Some(level) = cli.opt_level {
        options.opt_level = level;
    }
    if cli.no_verify {
        options.verify = false;
    }
    Ok(options)
}

fn load(target: &Target) -> Result<(Program, monoc::program::FunctionId, Vec<Object>), CompileError> {
    let program = Program::load(&target.image)?;
    let entry = program
        .find_function(&target.entry)
        .ok_or_else(|| CompileError::io(format!("no function `{}` in {}", target.entry, target.image.display())))?;
    let args = target.args.iter().map(|a| parse_arg(a)).collect::<Result<Vec<_>, _>>()?;
    Ok((program, entry, args))
}

fn execute(cli: &Cli) -> Result<(), CompileError> {
    match &cli.command {
        Commands::Run(target) => {
            let options = options(cli, &target.image)?;
            let (program, entry, args) = load(target)?;
            let compiled = monoc::compile(&program, entry, &args, &options)?;
            let result = monoc::run(&compiled, &args, &options)?;
            println!("{}", format_object(&result));
        }
        Commands::Ir(target) => {
            let options = options(cli, &target.image)?;
            let (program, entry, args) = load(target)?;
            let compiled = monoc::compile(&program, entry, &args, &options)?;
            print!("{}", compiled.module);
        }
        Commands::Types { target, json } => {
            let options = options(cli, &target.image)?;
            let (program, entry, args) = load(target)?;
            let compiled = monoc::compile(&program, entry, &args, &options)?;
            if *json {
                let text = serde_json::to_string_pretty(&compiled.types)
                    .map_err(|e| CompileError::io(format!("could not serialize report: {e}")))?;
                println!("{text}");
            } else {
                print!("{}", compiled.types);
            }
        }
        Commands::Compile { target, output, triple } => {
            let mut options = options(cli, &target.image)?;
            if let Some(triple) = triple {
                options.target = triple.clone();
            }
            let (program, entry, args) = load(target)?;
            let compiled = monoc::compile(&program, entry, &args, &options)?;
            let bytes = monoc::backend::object::emit_object(&compiled.module, &options)?;
            std::fs::write(output, &bytes)
                .map_err(|e| CompileError::io(format!("failed to write {}: {e}", output.display())))?;
            eprintln!("wrote {} ({} bytes, entry `{}`)", output.display(), bytes.len(), compiled.entry);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(err) = execute(&cli) {
        eprint!("{}", render_error(&err));
        std::process::exit(1);
    }
}
