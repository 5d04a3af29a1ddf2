//! Write command: load files, transform, erase, program, verify, jump

use std::path::PathBuf;

use stm8boot_core::session::Session;
use stm8boot_core::transport::Transport;

use super::{BarProgress, CmdResult};
use crate::cli::{FillSpec, MoveSpec, RangeSpec};

pub struct WriteArgs {
    pub files: Vec<PathBuf>,
    pub base: u32,
    pub erase: bool,
    pub mass_erase: bool,
    pub verify: bool,
    pub go: Option<u32>,
    pub clip: Option<RangeSpec>,
    pub cut: Vec<RangeSpec>,
    pub fill: Vec<FillSpec>,
    pub copy: Vec<MoveSpec>,
    pub move_range: Vec<MoveSpec>,
}

pub fn run<T: Transport>(session: &mut Session<T>, args: &WriteArgs) -> CmdResult {
    super::load_files(session, &args.files, args.base)?;
    apply_transforms(session, args)?;

    if args.mass_erase {
        println!("Mass erasing...");
        session.mass_erase()?;
    } else if args.erase {
        session.erase_for_image()?;
    }

    let written = session.program(&mut BarProgress::new())?;
    println!("Wrote {} bytes", written);

    if args.verify {
        session.verify(&mut BarProgress::new())?;
        println!("Verify OK");
    }

    if let Some(addr) = args.go {
        session.go(Some(addr))?;
        println!("Jumped to 0x{:06X}", addr);
    }
    Ok(())
}

/// Image transforms, applied clip first, then cut, fill, copy, move
fn apply_transforms<T: Transport>(session: &mut Session<T>, args: &WriteArgs) -> CmdResult {
    let image = session.image_mut();
    if let Some(r) = &args.clip {
        image.clip(r.lo, r.hi)?;
    }
    for r in &args.cut {
        image.cut(r.lo, r.hi)?;
    }
    for f in &args.fill {
        image.fill(f.lo, f.hi, f.value)?;
    }
    for m in &args.copy {
        image.copy_range(m.lo, m.hi, m.dst)?;
    }
    for m in &args.move_range {
        image.move_range(m.lo, m.hi, m.dst)?;
    }
    Ok(())
}
