use anyhow::{Context, Result, bail};
use cenc_decrypt::{
    ProtectionScheme,
    mp4::{TrackEncryption, extract_samples},
    scheme::fourcc,
};
use clap::Args;
use colored::Colorize;
use std::{fs, path::PathBuf};

/// Print the encryption layout (scheme, KID, IV and subsamples) of every sample in a segment.
#[derive(Debug, Clone, Args)]
pub struct Probe {
    /// Media segment to inspect.
    /// Without --init it must also contain the init segment (moov box).
    #[arg(required = true)]
    input: PathBuf,

    /// Init segment of the track, read for its tenc box.
    #[arg(long)]
    init: Option<PathBuf>,

    /// Maximum number of samples to print.
    #[arg(short = 'n', long)]
    limit: Option<usize>,
}

impl Probe {
    pub fn execute(self) -> Result<()> {
        let segment = fs::read(&self.input)
            .with_context(|| format!("cannot read {}", self.input.display()))?;

        let track = match &self.init {
            Some(init) => TrackEncryption::from_init(
                &fs::read(init).with_context(|| format!("cannot read {}", init.display()))?,
            )?,
            None => TrackEncryption::from_init(&segment)?,
        };

        let Some(track) = track else {
            bail!("no track encryption (tenc) box found, the track is not protected.");
        };

        let scheme = ProtectionScheme::resolve(track.scheme_type, track.pattern)
            .map(|x| x.to_string())
            .unwrap_or_else(|_| format!("{} (unsupported)", fourcc(track.scheme_type)));

        println!("{} {}", "scheme:".bold(), scheme);
        println!(
            "{} {}:{}",
            "pattern:".bold(),
            track.pattern.crypt_block_count,
            track.pattern.skip_block_count
        );
        println!("{} {}", "protected:".bold(), track.is_protected);
        println!("{} {}", "kid:".bold(), hex::encode(track.default_kid));

        match &track.constant_iv {
            Some(iv) => println!("{} {}", "constant iv:".bold(), hex::encode(iv)),
            None => println!("{} {}", "iv size:".bold(), track.per_sample_iv_size),
        }

        let samples = extract_samples(&track, &segment)?;
        println!("{} {}", "samples:".bold(), samples.len());

        for (i, sample) in samples
            .iter()
            .take(self.limit.unwrap_or(usize::MAX))
            .enumerate()
        {
            let location = format!(
                "#{:<5} {:>8}..{:<8} {:>7} bytes",
                i,
                sample.range.start,
                sample.range.end,
                sample.packet.len()
            );

            match sample.packet.encryption_info()? {
                Some(info) => {
                    let subsamples = if info.subsamples.is_empty() {
                        "whole".to_owned()
                    } else {
                        info.subsamples
                            .iter()
                            .map(|x| format!("{}/{}", x.clear_bytes, x.protected_bytes))
                            .collect::<Vec<_>>()
                            .join(" ")
                    };

                    println!(
                        "{} iv={} {}",
                        location,
                        hex::encode(&info.iv).cyan(),
                        subsamples
                    );
                }
                None => println!("{} {}", location, "clear".dimmed()),
            }
        }

        Ok(())
    }
}
