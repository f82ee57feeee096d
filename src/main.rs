use std::{fs, io::BufWriter, process::ExitCode};

use anyhow::Context;

use pdf_raster::{render_raw_content, RenderParams};

/// Rasterize a raw PDF content stream to a PNG.
///
/// Debugging tool: there is no PDF file parsing here, just this crate's
/// rendering pipeline over a bare stream of operators.
fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.len() < 2 {
        anyhow::bail!(
            "usage: pdf_raster <content-stream> <output.png> [width-pts] [height-pts] [dpi]"
        );
    }

    let content = fs::read(&args[0]).with_context(|| format!("reading {}", args[0]))?;

    let width: f32 = arg_or(&args, 2, 612.0)?;
    let height: f32 = arg_or(&args, 3, 792.0)?;
    let dpi: f32 = arg_or(&args, 4, 72.0)?;

    let params = RenderParams {
        dpi,
        background: Some([1.0, 1.0, 1.0, 1.0]),
        ..RenderParams::default()
    };

    let page = render_raw_content(&content, width, height, &params)
        .map_err(|err| anyhow::anyhow!("{}", err))?;

    for warning in &page.warnings {
        eprintln!("warning: {}", warning);
    }

    let file = fs::File::create(&args[1]).with_context(|| format!("creating {}", args[1]))?;
    page.surface
        .write_png(BufWriter::new(file))
        .map_err(|err| anyhow::anyhow!("{}", err))?;

    Ok(())
}

fn arg_or(args: &[String], index: usize, default: f32) -> anyhow::Result<f32> {
    match args.get(index) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid number {:?}", raw)),
        None => Ok(default),
    }
}
