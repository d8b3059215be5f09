use anyhow::{Context, Result, bail};
use cenc_decrypt::{
    ClearKeyCdm,
    mp4::{TrackEncryption, decrypt_segment},
};
use clap::Args;
use kdam::{BarExt, Column, RichProgress, term::Colorizer, tqdm};
use std::{fs, path::PathBuf};

/// Decrypt common encryption (cenc, cens, cbc1, cbcs) protected fragmented mp4 segments.
#[derive(Debug, Clone, Args)]
pub struct Decrypt {
    /// Media segments to decrypt, in playback order.
    /// Without --init the first input must also contain the init segment (moov box).
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Decryption key in KID:KEY format, both 32 hex characters.
    /// Can be used multiple times.
    #[arg(short, long = "key", value_name = "KID:KEY", required = true)]
    keys: Vec<String>,

    /// Init segment of the track, read for its tenc box.
    #[arg(long)]
    init: Option<PathBuf>,

    /// Output file, written as the init segment followed by every decrypted segment.
    #[arg(short, long, required = true)]
    output: PathBuf,
}

impl Decrypt {
    pub fn execute(self) -> Result<()> {
        let mut builder = ClearKeyCdm::builder();

        for key in &self.keys {
            builder = builder
                .key_pair(key)
                .with_context(|| format!("invalid --key {}", key))?;
        }

        let cdm = builder.build()?;
        log::debug!("loaded {} decryption keys", cdm.key_count());

        let mut output = Vec::new();
        let mut track = None;

        if let Some(init) = &self.init {
            let data =
                fs::read(init).with_context(|| format!("cannot read {}", init.display()))?;
            track = TrackEncryption::from_init(&data)?;
            output.extend_from_slice(&data);
        }

        let mut pb = RichProgress::new(
            tqdm!(
                total = self.input.len(),
                unit = " SEG".to_owned(),
                disable = self.input.len() < 2
            ),
            vec![
                Column::Text("[bold blue]Decrypting".to_owned()),
                Column::Animation,
                Column::Percentage(0),
                Column::Text("•".to_owned()),
                Column::CountTotal,
                Column::Text("•".to_owned()),
                Column::ElapsedTime,
            ],
        );

        for path in &self.input {
            let segment =
                fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;

            if track.is_none() {
                track = TrackEncryption::from_init(&segment)?;
            }

            let Some(track) = &track else {
                bail!(
                    "{} has no track encryption (tenc) box, pass the init segment using --init.",
                    path.display()
                );
            };

            if track.is_protected && !cdm.has_key(&track.default_kid) {
                log::warn!(
                    "no key given for default KID {}",
                    hex::encode(track.default_kid)
                );
            }

            let decrypted = decrypt_segment(&cdm, track, &segment)
                .with_context(|| format!("cannot decrypt {}", path.display()))?;
            output.extend_from_slice(&decrypted);
            pb.update(1)?;
        }

        fs::write(&self.output, &output)
            .with_context(|| format!("cannot write {}", self.output.display()))?;

        pb.write(format!(
            " {} {} segments to {}",
            "Decrypted".colorize("bold green"),
            self.input.len(),
            self.output.to_string_lossy().colorize("cyan")
        ))?;

        Ok(())
    }
}
