//! rxc - Rx front-end CLI
//!
//! Usage:
//!   rxc check <file.rx>        - Run semantic analysis
//!   rxc dump-scopes <file.rx>  - Print the scope tree after analysis
//!   rxc tokens <file.rx>       - Print the token stream

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};
use rxc::error::RxError;
use rxc::lexer::{Lexer, Token};
use rxc::parser::{Crate, Parser};
use rxc::semantic::{AnalyzerOptions, Pass, SemanticAnalyzer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Writes log records to stderr
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "error".red().bold(),
            Level::Warn => "warn".yellow().bold(),
            Level::Info => "info".green(),
            Level::Debug => "debug".cyan(),
            Level::Trace => "trace".dimmed(),
        };
        eprintln!("[{}] {}", level, record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Flags shared by the file commands
struct CliOptions {
    path: String,
    stop_after: Pass,
    verbosity: u8,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "check" | "dump-scopes" | "tokens" => {
            let options = match parse_options(command, &args[2..]) {
                Ok(options) => options,
                Err(message) => {
                    eprintln!("{}: {}", "Error".red(), message);
                    eprintln!("Usage: rxc {} <file.rx> [--stop-after <pass>] [-v|-vv]", command);
                    process::exit(1);
                }
            };
            init_logging(options.verbosity);

            let result = match command.as_str() {
                "check" => check_file(&options),
                "dump-scopes" => dump_scopes(&options),
                _ => print_tokens(&options),
            };
            if let Err(e) = result {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        "version" | "--version" | "-V" => {
            println!("{}", format!("rxc v{}", VERSION).cyan().bold());
        }
        _ => {
            eprintln!("{}: Unknown command '{}'", "Error".red(), command);
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("{}", format!("rxc v{}", VERSION).cyan().bold());
    println!();
    println!("{}", "Usage:".yellow().bold());
    println!(
        "  {} {}        Run semantic analysis",
        "rxc check".green(),
        "<file>".white()
    );
    println!(
        "  {} {}  Print the scope tree",
        "rxc dump-scopes".green(),
        "<file>".white()
    );
    println!(
        "  {} {}       Print the token stream",
        "rxc tokens".green(),
        "<file>".white()
    );
    println!("  {}                Show this help", "rxc help".green());
    println!("  {}             Show version", "rxc version".green());
    println!();
    println!("{}", "Options:".yellow().bold());
    println!(
        "  {} {}  Stop after {}",
        "--stop-after".green(),
        "<pass>".white(),
        pass_list().cyan()
    );
    println!("  {}                 Debug / trace logging", "-v, -vv".green());
    println!();
    println!("Supported file extension: {}", ".rx".cyan());
}

fn pass_list() -> String {
    Pass::ALL
        .iter()
        .map(|pass| pass.name())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn parse_options(command: &str, args: &[String]) -> Result<CliOptions, String> {
    let mut path = None;
    let mut stop_after = Pass::TypeCheck;
    let mut verbosity = 0;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--stop-after" => {
                let name = iter
                    .next()
                    .ok_or_else(|| "Missing pass after '--stop-after'".to_string())?;
                stop_after = Pass::from_name(name)
                    .ok_or_else(|| format!("Unknown pass '{}', expected one of {}", name, pass_list()))?;
            }
            "-v" => verbosity = verbosity.max(1),
            "-vv" => verbosity = 2,
            flag if flag.starts_with('-') => {
                return Err(format!("Unknown option '{}' for '{}'", flag, command));
            }
            file => {
                if path.replace(file.to_string()).is_some() {
                    return Err("Only one file may be given".to_string());
                }
            }
        }
    }

    Ok(CliOptions {
        path: path.ok_or_else(|| "Missing file argument".to_string())?,
        stop_after,
        verbosity,
    })
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn is_rx_file(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("rx"))
}

fn read_source_file(path: &str) -> Result<String, RxError> {
    if !is_rx_file(path) {
        return Err(RxError::io_error(&format!(
            "File '{}' does not have the .rx extension",
            path
        )));
    }

    fs::read_to_string(path)
        .map_err(|e| RxError::io_error(&format!("Could not read file '{}': {}", path, e)))
}

fn tokenize(path: &str, source: &str) -> Result<Vec<Token>, RxError> {
    Lexer::new(source, path).tokenize()
}

fn parse(path: &str, source: &str) -> Result<(usize, Crate), RxError> {
    let tokens = tokenize(path, source)?;
    let token_count = tokens.len();
    let krate = Parser::new(tokens).parse()?;
    Ok((token_count, krate))
}

/// Run the analyzer; errors get the file name and source line attached.
fn analyze(options: &CliOptions, source: &str, krate: &Crate) -> (SemanticAnalyzer, Result<(), RxError>) {
    let mut analyzer = SemanticAnalyzer::new(AnalyzerOptions {
        stop_after: options.stop_after,
        ..AnalyzerOptions::default()
    });
    let result = analyzer
        .analyze(krate)
        .map_err(|e| e.with_source(&options.path, source));
    (analyzer, result)
}

fn check_file(options: &CliOptions) -> Result<(), RxError> {
    let source = read_source_file(&options.path)?;
    let (token_count, krate) = parse(&options.path, &source)?;
    let (analyzer, result) = analyze(options, &source, &krate);

    for pass in analyzer.completed_passes() {
        println!("  {} {}", "✓".green(), pass);
    }
    result?;

    println!("{}", "═══════════════════════════════════════════".green());
    println!("{}", format!("✓ Check passed: '{}'", options.path).green().bold());
    println!("{}", "═══════════════════════════════════════════".green());
    println!();
    println!("{}", "Check Summary:".cyan().bold());
    println!("  ✓ Lexical analysis      - {} tokens", token_count);
    println!("  ✓ Syntax parsing        - {} items", krate.items.len());
    println!("  ✓ Scopes                - {} scopes", analyzer.scopes().len());
    if options.stop_after == Pass::TypeCheck {
        println!("  ✓ Exit points           - {}", analyzer.exit_calls());
    }
    println!();
    println!("{}", "No errors found!".green().bold());
    Ok(())
}

fn dump_scopes(options: &CliOptions) -> Result<(), RxError> {
    let source = read_source_file(&options.path)?;
    let (_, krate) = parse(&options.path, &source)?;
    let (analyzer, result) = analyze(options, &source, &krate);

    print!("{}", analyzer.scopes());
    result
}

fn print_tokens(options: &CliOptions) -> Result<(), RxError> {
    let source = read_source_file(&options.path)?;
    for token in tokenize(&options.path, &source)? {
        println!(
            "{:>4}:{:<3} {:<16} {}",
            token.span.line,
            token.span.column,
            format!("{:?}", token.kind).dimmed(),
            token.lexeme
        );
    }
    Ok(())
}
