//! The `linux` / `initrd` / `boot` / `unload` command surface, plus a tiny
//! script runner for feeding it a boot configuration.

use crate::{
    context::BootContext,
    error::{Error, Result},
    relocator::Relocator,
    source::FileSource
};
use alloc::{string::ToString, vec::Vec};

/// `linux FILE [ARGS...]`
pub fn cmd_linux<R, F>(ctx: &mut BootContext<R>, files: &mut F, args: &[&str]) -> Result<()>
where R: Relocator, F: FileSource + ?Sized {
    let Some(&path) = args.first() else {
        ctx.unload();
        return Err(Error::FilenameExpected);
    };
    let image = match files.read(path) {
        Ok(image) => image,
        Err(err) => {
            ctx.unload();
            return Err(err);
        }
    };
    ctx.load(&image, args)?;
    return Ok(());
}

/// `initrd FILE...`
pub fn cmd_initrd<R, F>(ctx: &mut BootContext<R>, files: &mut F, args: &[&str]) -> Result<()>
where R: Relocator, F: FileSource + ?Sized {
    ctx.attach_ramdisk(args, files)?;
    return Ok(());
}

/// `boot`. Returns only if the kernel could not be entered.
pub fn cmd_boot<R: Relocator>(ctx: &mut BootContext<R>) -> Result<()> {
    return match ctx.boot() {
        Ok(never) => match never {},
        Err(err) => Err(err)
    };
}

pub fn cmd_unload<R: Relocator>(ctx: &mut BootContext<R>) -> Result<()> {
    ctx.unload();
    return Ok(());
}

/// Run `script` one command per line. Blank lines and `#` comments are
/// skipped; the first failing command stops the run.
pub fn run_script<R, F>(ctx: &mut BootContext<R>, files: &mut F, script: &str) -> Result<()>
where R: Relocator, F: FileSource + ?Sized {
    for line in script.lines() {
        let line = line.split_once('#').map_or(line, |(code, _)| code);
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&cmd, args)) = words.split_first() else { continue; };

        log::debug!("> {}", line.trim());
        match cmd {
            "linux" => cmd_linux(ctx, files, args)?,
            "initrd" => cmd_initrd(ctx, files, args)?,
            "boot" => cmd_boot(ctx)?,
            "unload" => cmd_unload(ctx)?,
            _ => return Err(Error::UnknownCommand(cmd.to_string()))
        }
    }
    return Ok(());
}
