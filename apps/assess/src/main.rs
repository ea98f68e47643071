//! 胎儿脑 MRI 体数据质量评估.
//!
//! ```text
//! fetal-qa assess  <INPUTDIR> <OUTPUTDIR> --model <PROGRAM> [-t 0.4] [-c crops] [-d Best_Images_crop]
//! fetal-qa predict <INPUTDIR> <OUTPUTDIR> --model <PROGRAM>
//! ```

mod args;

use anyhow::Context;
use clap::Parser;
use fetal_qa::pipeline;
use fetal_qa::score::NpyCommandModel;
use fetal_qa::sink::LogSink;
use simple_logger::SimpleLogger;

use args::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger: &'static SimpleLogger =
        Box::leak(Box::new(SimpleLogger::new().with_level(cli.level())));
    log::set_logger(logger).context("cannot install logger")?;
    log::set_max_level(cli.level());
    let sink = LogSink::new(logger);

    let common = cli.command.common();
    let model = NpyCommandModel::new(&common.model, common.model_args.iter().cloned());
    let options = cli.command.options();
    sink.debug(format_args!("model command: {}", model.program().display()));

    let report = pipeline::run(&options, model, sink).with_context(|| {
        format!(
            "{:?} run on {} failed",
            options.mode,
            options.input_dir.display()
        )
    })?;

    sink.info(format_args!(
        "{} scored, {} failed, {} selected",
        report.records.len(),
        report.failures.len(),
        report.selected.len()
    ));
    if let Some(csv) = &report.output_csv {
        sink.info(format_args!("results written to {}", csv.display()));
    }
    Ok(())
}
