use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use bread_asm::{Config, Error};
use clap::Parser;
use env_logger::Env;
use path_absolutize::Absolutize;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to input source file
    #[clap(parse(from_os_str), value_name = "FILE")]
    file: PathBuf,

    /// Path to output binary file (Default: stdout)
    #[clap(parse(from_os_str), short, long)]
    output: Option<PathBuf>,

    /// Print the parsed program tree to stderr
    #[clap(long)]
    print_tree: bool,

    /// Log addresses and macro expansions
    #[clap(short, long)]
    verbose: bool,

    /// How deeply macro calls may nest
    #[clap(long, value_name = "DEPTH", default_value_t = 64)]
    max_macro_depth: usize,
}

const EXIT_ASSEMBLY_ERROR: u8 = 64;

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let source = match fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Cannot open file \"{}\" for reading: {e}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    let config = Config {
        max_expansion_depth: args.max_macro_depth,
    };
    let program = match bread_asm::parse(&source, &config) {
        Ok(program) => program,
        Err(e) => return report(&args.file, e),
    };
    if args.print_tree {
        eprint!("{program}");
    }
    let image = match bread_asm::link(&program) {
        Ok(image) => image,
        Err(e) => return report(&args.file, e),
    };
    log::info!("assembled {} byte(s)", image.len());

    let mut output: Box<dyn Write> = if let Some(path) = args.output {
        let result = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.clone());
        match result {
            Err(e) => {
                eprintln!("Cannot open file \"{}\" for writing: {e}", path.display());
                return ExitCode::FAILURE;
            }
            Ok(file) => Box::new(file),
        }
    } else {
        Box::new(io::stdout())
    };

    if let Err(e) = output.write_all(&image).and_then(|_| output.flush()) {
        eprintln!("Failed to write output: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn report(path: &Path, e: Error) -> ExitCode {
    let path = path
        .absolutize()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|_| path.to_path_buf());
    eprintln!("In \"{}\"\n\n{e}", path.display());
    ExitCode::from(EXIT_ASSEMBLY_ERROR)
}
