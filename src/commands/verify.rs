//! Verify command: compare files against target memory

use std::path::PathBuf;

use stm8boot_core::session::Session;
use stm8boot_core::transport::Transport;

use super::{BarProgress, CmdResult};

pub fn run<T: Transport>(session: &mut Session<T>, files: &[PathBuf], base: u32) -> CmdResult {
    super::load_files(session, files, base)?;
    session.verify(&mut BarProgress::new())?;
    println!("Verify OK");
    Ok(())
}
