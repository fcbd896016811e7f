use std::fs::File;
use std::io;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser as ClapParser;

use rox::error::LoxError;
use rox::lox::Lox;

#[derive(ClapParser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Lox source file to run; omit to start the interactive prompt
    script: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Cli = match Cli::try_parse() {
        Ok(args) => args,

        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            return Ok(());
        }

        // Anything else is argv misuse, e.g. more than one script.
        Err(_) => {
            println!("Usage: rox [script]");
            std::process::exit(64);
        }
    };

    match args.script {
        Some(path) => run_file(path),
        None => run_prompt(),
    }
}

fn run_file(path: PathBuf) -> anyhow::Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    let mut reader: BufReader<File> = BufReader::new(File::open(path)?);
    reader.read_to_end(&mut buf)?;

    let source: String = String::from_utf8(buf).map_err(LoxError::from)?;

    let mut lox = Lox::new(io::stdout());
    lox.run(&source);

    if lox.had_error() {
        std::process::exit(65);
    }

    if lox.had_runtime_error() {
        std::process::exit(70);
    }

    Ok(())
}

fn run_prompt() -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lox = Lox::new(io::stdout());

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            // EOF ends the session.
            break;
        }

        lox.run(&line);
        lox.reset_errors();
    }

    Ok(())
}
