use argh::FromArgs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use xsh::{Config, DEFAULT_PROMPT, Interpreter};

#[derive(FromArgs)]
/// A small command interpreter: runs programs with `$VAR` expansion, `<`/`>`
/// redirection, two-stage `|` pipelines and `&` background jobs.
struct Args {
    #[argh(option, short = 'c')]
    /// run a single command line and exit with its status.
    command: Option<String>,

    #[argh(option, default = "DEFAULT_PROMPT.to_owned()")]
    /// prompt shown before each line.
    prompt: String,

    #[argh(option)]
    /// file to load line history from and save it to.
    history: Option<PathBuf>,

    #[argh(switch, short = 'v')]
    /// log at debug level unless RUST_LOG says otherwise.
    verbose: bool,
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut sh = Interpreter::default().with_config(Config {
        prompt: args.prompt,
        history: args.history,
    });

    if let Some(line) = args.command {
        return match sh.run_line(&line) {
            Ok(code) => status(code),
            Err(err) => {
                eprintln!("xsh: {err:#}");
                let code = err
                    .downcast_ref::<xsh::executor::DispatchError>()
                    .map_or(1, |e| e.exit_code());
                status(code)
            }
        };
    }

    match sh.repl() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("xsh: {err}");
            ExitCode::FAILURE
        }
    }
}

fn status(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
