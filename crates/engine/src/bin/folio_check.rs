use std::path::PathBuf;

use anyhow::Context as _;
use engine::PdfEngine;
use folio_core::{Destination, Document, DocumentEngine, OutlineNode};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let mut lib_path: Option<PathBuf> = None;
    let mut pdf_path: Option<PathBuf> = None;
    let mut page_number: u32 = 1;
    let mut scale: f32 = 1.0;

    let mut args = std::env::args_os().skip(1);
    while let Some(arg) = args.next() {
        let arg_str = arg.to_string_lossy();
        match arg_str.as_ref() {
            "--lib" => {
                let value = args.next().context("missing value for --lib")?;
                lib_path = Some(PathBuf::from(value));
            }
            "--pdf" => {
                let value = args.next().context("missing value for --pdf")?;
                pdf_path = Some(PathBuf::from(value));
            }
            "--page" => {
                let value = args.next().context("missing value for --page")?;
                let value_str = value.to_string_lossy();
                page_number = value_str
                    .parse::<u32>()
                    .with_context(|| format!("invalid --page value: {value_str}"))?;
                if page_number == 0 {
                    anyhow::bail!("--page must be >= 1");
                }
            }
            "--scale" => {
                let value = args.next().context("missing value for --scale")?;
                let value_str = value.to_string_lossy();
                scale = value_str
                    .parse::<f32>()
                    .with_context(|| format!("invalid --scale value: {value_str}"))?;
            }
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            other => anyhow::bail!("unknown arg: {other} (try --help)"),
        }
    }

    if let Some(path) = lib_path.as_ref() {
        unsafe {
            std::env::set_var("FOLIO_PDFIUM_LIB_PATH", path);
        }
    }

    let engine = PdfEngine::new();
    engine.check_pdfium().context("bind pdfium")?;
    println!("pdfium: ok");

    let Some(pdf) = pdf_path else {
        return Ok(());
    };
    let content = std::fs::read(&pdf).with_context(|| format!("read {}", pdf.display()))?;
    let document = engine
        .open(&content)
        .with_context(|| format!("open {}", pdf.display()))?;
    println!("pdf: ok (pages={})", document.page_count());

    let outline = document.outline()?;
    println!("outline: {} top-level entries", outline.len());
    print_outline(&document, &outline, 0);

    let size = document.page_size(page_number, scale)?;
    let bitmap = document.render_page(page_number, scale)?;
    println!(
        "render: ok (page={} viewport={}x{} bitmap={}x{})",
        page_number, size.width, size.height, bitmap.width, bitmap.height
    );

    Ok(())
}

fn print_outline(document: &impl Document, nodes: &[OutlineNode], depth: usize) {
    for node in nodes {
        let target = match &node.destination {
            Some(destination) => match destination_page(document, destination) {
                Ok(page) => format!("p{page}"),
                Err(err) => format!("unresolved ({err})"),
            },
            None => "-".to_string(),
        };
        println!("{:indent$}{} [{target}]", "", node.title, indent = depth * 2);
        print_outline(document, &node.children, depth + 1);
    }
}

fn destination_page(document: &impl Document, destination: &Destination) -> anyhow::Result<u32> {
    let location = match destination {
        Destination::Named(name) => document.resolve_named_destination(name)?,
        Destination::Explicit(location) => *location,
    };
    Ok(document.location_to_page_index(location)? + 1)
}

fn print_help() {
    println!(
        "\
folio_check

Usage:
  cargo run -p engine --bin folio_check -- [--lib <path-to-libpdfium>] [--pdf <file>]

Options:
  --lib <path>   Path to shared library (e.g. libpdfium.so/libpdfium.dylib/pdfium.dll)
  --pdf <path>   PDF to open: prints the outline and renders one page
  --page <n>     Page number to render (1-based, default: 1)
  --scale <f>    Render scale (default: 1.0)
  --help         Show this help
"
    );
}
