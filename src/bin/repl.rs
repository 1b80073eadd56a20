use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use clap::Parser as ClapParser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use minilisp::parser::Parser;
use minilisp::{EvalConfig, Evaluator, Expr, MAX_CALL_DEPTH, Result, parse_all};

/// Native stack for the interpreter thread. Deep recursion must hit the
/// call-depth cap long before it exhausts this.
const STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(ClapParser, Debug)]
#[command(version, about = "A small Lisp interpreter", long_about = None)]
struct Cli {
    /// Script files to load in order. Without files or -c, starts the REPL.
    files: Vec<PathBuf>,

    /// Evaluate one expression and print its value
    #[arg(short = 'c', long = "command", value_name = "EXPR")]
    command: Option<String>,

    /// Log every function call and its result to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Nested calls allowed before a stack overflow error
    #[arg(long, value_name = "N", default_value_t = MAX_CALL_DEPTH)]
    max_depth: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let worker = thread::Builder::new()
        .name("minilisp".to_string())
        .stack_size(STACK_SIZE)
        .spawn(move || run(cli));
    match worker.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => {
            eprintln!("Error: interpreter thread panicked");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: failed to start interpreter thread: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "warn,minilisp::calls=info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> ExitCode {
    let mut evaluator = Evaluator::with_config(EvalConfig {
        max_call_depth: cli.max_depth,
        trace_calls: cli.verbose,
    });

    let mut ok = true;
    for path in &cli.files {
        ok &= run_script(&mut evaluator, path);
    }

    if let Some(command) = &cli.command {
        match evaluator.eval_str(command) {
            Ok(value) => println!("{value}"),
            Err(err) => {
                report(&err);
                ok = false;
            }
        }
    } else if cli.files.is_empty() {
        return repl(&mut evaluator);
    }

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn report(err: &minilisp::Error) {
    if err.is_syntax() {
        eprintln!("{err}");
    } else {
        eprintln!("Error: {err}");
    }
}

/// Evaluates each top-level form of a file, reporting failures and carrying
/// on with the next form. A syntax error ends the file.
fn run_script(evaluator: &mut Evaluator, path: &Path) -> bool {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("Error: {}: {err}", path.display());
            return false;
        }
    };
    let origin = path.display().to_string();
    let globals = evaluator.globals().clone();

    let mut ok = true;
    for form in Parser::with_origin(&text, &origin) {
        match form {
            Ok((expr, _)) => {
                if let Err(err) = evaluator.eval(&expr, &globals) {
                    report(&err);
                    ok = false;
                }
            }
            Err(err) => {
                report(&err);
                return false;
            }
        }
    }
    ok
}

enum Input {
    Complete,
    /// The buffer ends inside a form; keep reading lines
    Incomplete,
}

fn eval_input(evaluator: &mut Evaluator, text: &str) -> Input {
    // Parse everything first so a form is never evaluated twice while the
    // buffer is still growing.
    let forms: Result<Vec<Expr>> = parse_all(text).map(|form| form.map(|(expr, _)| expr)).collect();
    match forms {
        Err(err) if err.is_unterminated() => return Input::Incomplete,
        Err(err) => report(&err),
        Ok(forms) => {
            let globals = evaluator.globals().clone();
            for expr in forms {
                match evaluator.eval(&expr, &globals) {
                    Ok(value) => println!("{value}"),
                    Err(err) => report(&err),
                }
            }
        }
    }
    Input::Complete
}

fn repl(evaluator: &mut Evaluator) -> ExitCode {
    println!("minilisp v{}", env!("CARGO_PKG_VERSION"));
    println!("Type expressions to evaluate them, :help for commands, Ctrl+D to exit.");
    println!();

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("Error: cannot start line editor: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "lisp> " } else { "... " };
        match editor.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    match line.trim() {
                        "" => continue,
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(evaluator);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                pending.push_str(&line);
                pending.push('\n');
                if let Input::Complete = eval_input(evaluator, &pending) {
                    let _ = editor.add_history_entry(pending.trim_end());
                    pending.clear();
                }
            }
            Err(ReadlineError::Interrupted) => {
                if pending.is_empty() {
                    println!("Interrupted. Use Ctrl+D or :quit to exit.");
                }
                pending.clear();
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn print_help() {
    println!("Commands:");
    println!("  :help    - Show this help message");
    println!("  :env     - Show bound names");
    println!("  :quit    - Exit the interpreter");
    println!("  :exit    - Exit the interpreter");
    println!();
    println!("An unfinished expression continues on the next line at the '... ' prompt.");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (setq x 42)");
    println!("  (if (> x 0) \"positive\" \"not positive\")");
    println!("  (defun square (x) (* x x))");
    println!("  (funcall #'(lambda (y) (+ x y)) 1)");
}

fn print_environment(evaluator: &Evaluator) {
    const WIDTH: usize = 78;
    let mut line = String::new();
    for name in evaluator.globals().names() {
        if !line.is_empty() && line.len() + name.len() + 1 > WIDTH {
            println!("  {line}");
            line.clear();
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&name);
    }
    if !line.is_empty() {
        println!("  {line}");
    }
}
