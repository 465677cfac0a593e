// ═══════════════════════════════════════════════════════════
// ycpc: inspect bytecode files and load modules
// ═══════════════════════════════════════════════════════════

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ycp_bytecode::dump::dump;
use ycp_bytecode::{file, Config, Error, Result, Session};

#[derive(Parser, Debug)]
#[command(name = "ycpc")]
#[command(about = "Inspect YCP bytecode files and load compiled modules")]
struct Cli {
    /// Extra module directory, searched before YCP_MODULE_PATH
    #[arg(short = 'I', long = "include", global = true)]
    include: Vec<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a bytecode file and print its tree
    Dump { file: PathBuf },
    /// Print the header version of a bytecode file and whether it is readable
    Check { file: PathBuf },
    /// Load modules by name through the search path
    Load {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Interactive session sharing one module cache
    Shell,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::from_env().with_dirs(cli.include);
    info!("module path: {:?}", config.module_path);
    let mut session = Session::from_config(&config);

    if let Err(e) = run(cli.command, &mut session) {
        error!("{}", e);
        process::exit(1);
    }
}

type CliResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn run(command: Command, session: &mut Session) -> CliResult {
    match command {
        Command::Dump { file }   => dump_file(session, &file)?,
        Command::Check { file }  => check_file(&file)?,
        Command::Load { names }  => names.iter().try_for_each(|name| load(session, name))?,
        Command::Shell           => shell(session)?,
    }
    Ok(())
}

fn dump_file(session: &mut Session, path: &Path) -> Result<()> {
    let root = file::read_file(session, path)?;
    print!("{}", dump(&root));
    Ok(())
}

fn check_file(path: &Path) -> Result<()> {
    let data = fs::read(path).map_err(|e| Error::io(path, e))?;
    let version = file::check_header(&data)?;
    println!("{}: bytecode {} (readable, this build writes {})", path.display(), version, file::VERSION);
    Ok(())
}

fn load(session: &mut Session, name: &str) -> Result<()> {
    let cached = session.cache().contains(name);
    let root = session.load_module(name)?;
    let note = if cached { " (cached)" } else { "" };
    println!("module {}{}", name, note);
    if let Some(block) = root.as_block() {
        for entry in block.namespace.symbols() {
            println!("  {}", entry);
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Shell
// ═══════════════════════════════════════════════════════════

fn shell(session: &mut Session) -> std::result::Result<(), ReadlineError> {
    let mut rl = DefaultEditor::new()?;
    println!("ycpc shell, bytecode {}. Type 'help' for commands.", file::VERSION);

    loop {
        let line = match rl.readline("ycpc> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                error!("read error: {}", e);
                break;
            }
        };
        let _ = rl.add_history_entry(line.as_str());

        let mut words = line.split_whitespace();
        let outcome = match (words.next(), words.next()) {
            (None, _)                        => Ok(()),
            (Some("quit" | "exit"), _)       => break,
            (Some("help"), _)                => { print_help(); Ok(()) }
            (Some("modules"), _)             => {
                for name in session.cache().names() {
                    println!("  {}", name);
                }
                Ok(())
            }
            (Some("load"), Some(name))       => load(session, name),
            (Some("symbols"), Some(name))    => match session.cache().get(name) {
                Some(root) => {
                    if let Some(block) = root.as_block() {
                        for entry in block.namespace.symbols() {
                            println!("  {}", entry);
                        }
                    }
                    Ok(())
                }
                None => Err(Error::ModuleNotFound(name.to_string())),
            },
            (Some("dump"), Some(name))       => match session.cache().get(name) {
                Some(root) => { print!("{}", dump(&root)); Ok(()) }
                None => Err(Error::ModuleNotFound(name.to_string())),
            },
            (Some(cmd), _)                   => {
                eprintln!("unknown command '{}', try 'help'", cmd);
                Ok(())
            }
        };
        if let Err(e) = outcome {
            error!("{}", e);
        }
    }
    Ok(())
}

fn print_help() {
    println!();
    println!("  load <name>      load a module (served from the cache after the first time)");
    println!("  symbols <name>   list the declarations of a loaded module");
    println!("  dump <name>      print the tree of a loaded module");
    println!("  modules          list loaded modules");
    println!("  quit             leave the shell");
    println!();
}
