//! pagewright – command-line document builder.
//!
//! Usage:
//!   pagewright <input>... [-o output.pdf] [--config cfg.json] [--cover] [--toc]
//!              [--formulas] [--formula-cmd "prog args"] [--landscape] [--title "T"]
//!
//! Inputs ending in `.html`/`.htm` are read as markup, anything else as plain
//! text. If `-o` is omitted the PDF is written next to the first input with
//! the same stem (e.g. `report.html` → `report.pdf`).

use std::{env, path::PathBuf, process};

use pagewright::config::{DocumentConfig, PageOrientation};
use pagewright::formula::{CommandFormulaRenderer, FormulaRenderer};
use pagewright::pipeline::{build_to_file, SourceBlock};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut inputs: Vec<PathBuf> = Vec::new();
    let mut output_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut formula_cmd: Option<String> = None;
    let mut title: Option<String> = None;
    let mut landscape = false;
    let mut cover = false;
    let mut toc = false;
    let mut formulas = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--output" | "-o" => output_path = Some(PathBuf::from(value(&mut iter, arg, &args[0]))),
            "--config" | "-c" => config_path = Some(PathBuf::from(value(&mut iter, arg, &args[0]))),
            "--formula-cmd" => {
                formula_cmd = Some(value(&mut iter, arg, &args[0]));
                formulas = true;
            }
            "--title" | "-t" => title = Some(value(&mut iter, arg, &args[0])),
            "--landscape" | "-l" => landscape = true,
            "--cover" => cover = true,
            "--toc" => toc = true,
            "--formulas" => formulas = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => inputs.push(PathBuf::from(path)),
        }
    }

    let Some(first) = inputs.first().cloned() else {
        eprintln!("Error: no input file specified.");
        print_usage(&args[0]);
        process::exit(1);
    };

    let output = output_path.unwrap_or_else(|| {
        let mut o = first.clone();
        o.set_extension("pdf");
        o
    });

    let mut config = match &config_path {
        Some(path) => match DocumentConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading '{}': {e}", path.display());
                process::exit(1);
            }
        },
        None => DocumentConfig {
            // Default title: stem of the first input.
            title: first
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Document")
                .to_string(),
            ..DocumentConfig::default()
        },
    };
    if let Some(t) = title {
        config.title = t;
    }
    if landscape {
        config.orientation = PageOrientation::Landscape;
    }
    config.include_cover |= cover;
    config.include_toc |= toc;
    config.process_formulas |= formulas;

    let mut blocks = Vec::with_capacity(inputs.len());
    for input in &inputs {
        match SourceBlock::from_path(input) {
            Ok(block) => blocks.push(block),
            Err(e) => {
                eprintln!("Error reading '{}': {e}", input.display());
                process::exit(1);
            }
        }
    }

    let renderer = formula_cmd
        .as_deref()
        .and_then(CommandFormulaRenderer::from_command_line);
    let renderer_ref = renderer.as_ref().map(|r| r as &dyn FormulaRenderer);

    match build_to_file(&blocks, &config, renderer_ref, &output) {
        Ok(layout) => {
            let pages = layout.pages.len();
            eprintln!(
                "Wrote '{}' ({} page{})",
                output.display(),
                pages,
                if pages == 1 { "" } else { "s" }
            );
        }
        Err(e) => {
            eprintln!("Error generating PDF: {e}");
            process::exit(1);
        }
    }
}

/// Take the value following `flag`, or exit with usage.
fn value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str, prog: &str) -> String {
    match iter.next() {
        Some(v) => v.clone(),
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("pagewright – paginated PDF builder");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <input>... [-o output.pdf] [options]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input>...          .html/.htm files are read as markup, others as plain text");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --output, -o        Output path (default: first input's stem with .pdf)");
    eprintln!("  --config, -c        JSON document configuration");
    eprintln!("  --title, -t         Document title (default: first input's stem)");
    eprintln!("  --cover             Add a cover page");
    eprintln!("  --toc               Add a table of contents");
    eprintln!("  --formulas          Extract $...$ and $$...$$ formulas");
    eprintln!("  --formula-cmd CMD   Program that reads a formula on stdin and writes PNG to stdout");
    eprintln!("  --landscape, -l     Landscape A4");
    eprintln!("  --help              Print this message");
}
