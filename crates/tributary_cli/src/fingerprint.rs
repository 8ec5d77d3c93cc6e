//! `tributary fingerprint`: prints the cache version token of a directory.

use std::path::Path;

use tributary_cache::Fingerprinter;

use crate::FingerprintArgs;

/// Runs the `fingerprint` subcommand.
pub fn run(args: &FingerprintArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let dir = Path::new(&args.dir);
    if !dir.is_dir() {
        return Err(format!("{} is not a directory", dir.display()).into());
    }
    let token = Fingerprinter::fingerprint("cli", dir, &args.args)?;
    println!("{token}");
    Ok(0)
}
