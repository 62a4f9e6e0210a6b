//! Greeting line example
//!
//! One greeter feeds eight printers. Greet tasks decide what to say and
//! hand the printing off as follow-up tasks.
//!
//! Run with: RUST_LOG=info cargo run --example greeting

use assembly_line::prelude::*;
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Stage {
    Greet,
    Print,
}

struct GreetTask {
    name: String,
}

impl Task<Stage> for GreetTask {
    fn category(&self) -> Stage {
        Stage::Greet
    }

    fn execute(&mut self, _token: &CancellationToken) -> Result<FollowUps<Stage>> {
        log::info!("greet task: {}", self.name);
        thread::sleep(Duration::from_millis(250));

        let lines = match self.name.as_str() {
            // Friends get a short hello.
            "Andy" | "Nathan" => vec![format!("Hey {}!", self.name)],
            // Kirk gets the cold shoulder, Tim ruins it for everyone.
            "Kirk" | "Tim" => Vec::new(),
            _ => vec![
                format!("Hi {}", self.name),
                format!("Welcome to the line {}.", self.name),
            ],
        };

        Ok(lines
            .into_iter()
            .map(|text| Box::new(PrintTask { text }) as BoxedTask<Stage>)
            .collect())
    }

    fn name(&self) -> &str {
        "GreetTask"
    }
}

struct PrintTask {
    text: String,
}

impl Task<Stage> for PrintTask {
    fn category(&self) -> Stage {
        Stage::Print
    }

    fn execute(&mut self, _token: &CancellationToken) -> Result<FollowUps<Stage>> {
        // Printing takes a while, so it gets a pool of workers.
        thread::sleep(Duration::from_millis(250));
        log::info!("print task: {}", self.text);
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "PrintTask"
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let line = Line::with_config(LineConfig::new("greeting"))?;
    let greet = line.new_group(Stage::Greet, 1)?;
    let print = line.new_group(Stage::Print, 8)?;

    line.start(&CancellationToken::new())?;

    print.push(PrintTask {
        text: "This is the assembly line".to_string(),
    })?;

    for name in [
        "Andy", "Nathan", "Kirk", "Rebecca", "Miles", "Tim", "Emily", "Steven", "George",
    ] {
        greet.push(GreetTask {
            name: name.to_string(),
        })?;
    }

    // Drain every greeting and the print tasks they produce.
    line.finish()?;
    Ok(())
}
