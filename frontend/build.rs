extern crate rflex;
use std::env;
use std::path::Path;

fn main() {
    let Ok(out_dir) = env::var("OUT_DIR") else {
        eprintln!("OUT_DIR environment variable not set");
        std::process::exit(1);
    };
    let dest = Path::new(&out_dir).join("lexer.rs");
    let path = Path::new("src").join("lexer.l");
    println!("cargo:rerun-if-changed={}", path.display());
    if let Err(e) = rflex::process(path, Some(dest)) {
        for cause in <dyn failure::Fail>::iter_chain(&e) {
            eprintln!("{}: {}", cause.name().unwrap_or("Error"), cause);
        }
        std::process::exit(1);
    }
}
