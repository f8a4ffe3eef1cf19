use std::path::PathBuf;

fn main() {
    let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let workspace_root = PathBuf::from(manifest_dir).join("..").join("..");

    let pdfium_dir = workspace_root.join(".pdfium");
    let extracted_dir = pdfium_dir.join("extract").join("lib");
    let extracted_bin_dir = pdfium_dir.join("extract").join("bin");

    let Some(lib_name) = pdfium_library_filename() else {
        println!("cargo:warning=no known Pdfium library name for this target; rendering needs FOLIO_PDFIUM_LIB_PATH at run time");
        return;
    };
    let candidates = [
        pdfium_dir.join(lib_name),
        extracted_dir.join(lib_name),
        extracted_bin_dir.join(lib_name),
    ];

    match candidates.iter().find(|p| p.is_file()) {
        Some(lib) => {
            println!("cargo:rustc-env=FOLIO_PDFIUM_LIB_PATH={}", lib.display());
            println!("cargo:rerun-if-changed={}", lib.display());
        }
        None => {
            println!(
                "cargo:warning=`{lib_name}` not found under {}; Pdfium is looked up at run time (FOLIO_PDFIUM_LIB_PATH, FOLIO_PDFIUM_DIR, next to the executable, system library)",
                pdfium_dir.display()
            );
            println!("cargo:rerun-if-changed={}", pdfium_dir.display());
        }
    }
}

fn pdfium_library_filename() -> Option<&'static str> {
    match std::env::var("CARGO_CFG_TARGET_OS").as_deref() {
        Ok("linux") => Some("libpdfium.so"),
        Ok("macos") => Some("libpdfium.dylib"),
        Ok("windows") => Some("pdfium.dll"),
        _ => None,
    }
}
