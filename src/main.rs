//! # kagami CLI
//!
//! Command-line interface for the duplicate archive detector.
//!
//! ## Usage
//! ```bash
//! kagami local --scan-dir ~/comics
//! kagami check --scan-dir ~/comics --max-image-dist 3
//! ```

mod cli;

use kagami::Result;

fn main() -> Result<()> {
    cli::run()
}
