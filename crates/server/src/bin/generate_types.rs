//! Run with: cargo run --package server --bin generate-types --features typescript

use std::fs;
use std::path::Path;

#[cfg(feature = "typescript")]
fn export<T: ts_rs::TS + 'static>(out_dir: &Path) {
    if let Err(e) = T::export_all_to(out_dir) {
        eprintln!("Failed to export {}: {}", T::name(), e);
        std::process::exit(1);
    }
}

fn main() {
    println!("Generating TypeScript types...");

    let out_dir = Path::new("frontend/src/types/generated");

    if let Err(e) = fs::create_dir_all(out_dir) {
        eprintln!("Failed to create output directory: {}", e);
        std::process::exit(1);
    }

    #[cfg(feature = "typescript")]
    {
        export::<stackforge_core::JobStatus>(out_dir);
        export::<stackforge_core::Job>(out_dir);
        export::<stackforge_core::StepStatus>(out_dir);
        export::<stackforge_core::Step>(out_dir);

        export::<events::Event>(out_dir);

        export::<orchestrator::JobDetails>(out_dir);

        export::<server::routes::OrchestrateRequest>(out_dir);
        export::<server::routes::OrchestrateResponse>(out_dir);
        export::<server::routes::JobListResponse>(out_dir);
    }

    println!("TypeScript types generated in {}", out_dir.display());
}
