//! Interactive playground for the rule tables: type a request, get the
//! interpretation back as JSON.
//!
//! `:tz <IANA name>` switches the timezone, `:lang <uz|ru|en|auto>` forces or
//! clears the language hint.

use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use log::error;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use taqvim::{Config, ExtractionContext, Interpreter, Language, RuleTables};

fn main() -> Result<()> {
    taqvim::init_logger();

    let config = Config::load().unwrap_or_else(|e| {
        error!("Using default configuration: {:#}", e);
        Config::default()
    });
    let interpreter = Interpreter::new(
        RuleTables::builtin(),
        config.interpreter.statistical_detection,
        config.interpreter.max_prompt_chars,
    );
    let mut timezone: Tz = config.interpreter.default_timezone;
    let mut hint: Option<Language> = None;

    let mut rl = DefaultEditor::new()?;
    println!("taqvim interpreter ({}). Ctrl-D to quit.", timezone);

    loop {
        let readline = rl.readline(">> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(name) = line.strip_prefix(":tz ") {
                    match name.trim().parse::<Tz>() {
                        Ok(tz) => {
                            timezone = tz;
                            println!("timezone: {}", timezone);
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                    continue;
                }
                if let Some(code) = line.strip_prefix(":lang ") {
                    match code.trim() {
                        "auto" => hint = None,
                        other => match other.parse::<Language>() {
                            Ok(language) => hint = Some(language),
                            Err(e) => println!("Error: {}", e),
                        },
                    }
                    continue;
                }

                let ctx = ExtractionContext::new(Utc::now(), timezone);
                match interpreter.interpret(line, hint, &ctx) {
                    Ok(interpretation) => println!("{}", serde_json::to_string_pretty(&interpretation)?),
                    Err(e) => println!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}
