//! Interactive REPL.
//!
//! A rustyline session over the extended environment: multi-line input is
//! accepted until parentheses balance, ground bindings tab-complete, and
//! history persists in the user's home directory.

pub mod helper;

pub use helper::KernelHelper;

use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::Editor;
use std::path::PathBuf;

use crate::backend::types::Value;
use crate::backend::Interp;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kerneltron_history"))
}

pub fn run(interp: &Interp) -> Result<(), ReadlineError> {
    println!("KernelTron REPL v{}", VERSION);
    println!("Enter Kernel expressions. Ctrl-D exits.\n");

    let env = match interp.extended_environment() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(());
        }
    };

    let mut names = Vec::new();
    interp.ground.for_each_binding(|name, _| {
        names.push(name.as_str().to_string());
    });
    names.sort();

    let mut editor: Editor<KernelHelper, FileHistory> = Editor::new()?;
    editor.set_helper(Some(KernelHelper::new(names)));
    let history = history_path();
    if let Some(path) = &history {
        let _ = editor.load_history(path);
    }

    loop {
        match editor.readline("kernel> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;

                match interp.run_str(line, &env) {
                    Ok(result) => match &*result {
                        // Unhandled errors were already reported on their
                        // way through the base error continuation.
                        Value::Inert | Value::Error(_) => {}
                        _ => println!("{}", result),
                    },
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        }
    }

    if let Some(path) = &history {
        let _ = editor.save_history(path);
    }
    println!("Goodbye!");
    Ok(())
}
