use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use nl2sql::config::AskArgs;
use nl2sql::{catalog, telemetry, Controller, SqlCheck};
use nl2sql_driver::{device, HostCapabilities, ModelLoader};
use tracing::info;

fn main() -> Result<()> {
    let args = AskArgs::parse();
    let _trace = telemetry::init(&args.telemetry, 0)?;

    let kind = device::select(HostCapabilities::detect(), args.model.cpu);
    let loader = Arc::new(ModelLoader::new(args.model.source(), kind));

    let question = match args.question {
        Some(q) => q,
        None => {
            let q = catalog::pick(&mut rand::rng());
            eprintln!("-- {q}");
            q.to_string()
        }
    };

    let controller = Controller::new(loader.handle()?, args.model.params());
    let rendered = controller.generate_sql(&question)?;

    info!(elapsed = ?rendered.elapsed, "done");

    if args.raw {
        println!("{}", rendered.generated_text);
    } else {
        println!("{}", rendered.sql);

        if let SqlCheck::Invalid { reason } = &rendered.check {
            eprintln!("-- warning: output does not parse: {reason}");
        }
    }

    Ok(())
}
