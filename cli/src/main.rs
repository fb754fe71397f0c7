use anyhow::{anyhow, Error};
use structopt::StructOpt;
use wmapro_decoder::{CodecParameters, Decoder, PacketSource};

use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

fn main() -> Result<(), Error> {
    env_logger::init();

    let opts = Opts::from_args();

    match opts.command {
        Command::Decode {
            input,
            output,
            stream,
        } => {
            let params = stream.codec_parameters()?;
            let mut decoder = Decoder::new(&params)?;
            let packets = read_packets(&input, params.block_align as usize)?;

            let mut writer = BufWriter::new(File::create(output)?);
            let mut lossy_frames = 0;

            for (i, packet) in packets.iter().enumerate() {
                let decoded = match decoder.decode_packet(packet) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        log::error!("ERROR packet {}: {}", i, e);
                        continue;
                    }
                };

                for e in &decoded.errors {
                    log::warn!("packet {}: {}", i, e);
                }
                lossy_frames += decoded.frames.iter().filter(|f| f.lossy).count();

                for sample in decoded.samples {
                    writer.write_all(&sample.to_le_bytes())?;
                }
            }
            writer.flush()?;

            log::info!(
                "{} packets, {} frames, {} lossy",
                packets.len(),
                decoder.frames_decoded(),
                lossy_frames
            );
        }
        Command::Play { input, stream } => {
            let params = stream.codec_parameters()?;
            let decoder = Decoder::new(&params)?;
            let packets = read_packets(&input, params.block_align as usize)?;

            let source = PacketSource::new(decoder, packets.into_iter());

            let device =
                rodio::default_output_device().ok_or_else(|| anyhow!("no output device"))?;
            let sink = rodio::Sink::new(&device);

            sink.append(source);
            sink.play();
            sink.sleep_until_end();
        }
    }

    Ok(())
}

/// Splits a raw packet dump into `block_align` sized packets.
fn read_packets(path: &Path, block_align: usize) -> Result<Vec<Vec<u8>>, Error> {
    let data = std::fs::read(path)?;

    let packets = data.chunks_exact(block_align);
    if !packets.remainder().is_empty() {
        log::warn!(
            "ignoring {} trailing bytes of a partial packet",
            packets.remainder().len()
        );
    }

    Ok(packets.map(|packet| packet.to_vec()).collect())
}

fn parse_int(s: &str) -> Result<u32, Error> {
    let value = match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    Ok(value)
}

fn parse_u16(s: &str) -> Result<u16, Error> {
    let value = parse_int(s)?;
    u16::try_from(value).map_err(|_| anyhow!("{} does not fit in 16 bits", s))
}

fn parse_hex(s: &str) -> Result<Vec<u8>, Error> {
    if s.len() % 2 != 0 {
        return Err(anyhow!("odd number of hex digits"));
    }

    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(Error::from))
        .collect()
}

#[derive(StructOpt)]
#[structopt(name = "wmapro-decoder-cli")]
struct Opts {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Decodes a packet dump to raw s16le PCM
    Decode {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
        #[structopt(flatten)]
        stream: StreamOpts,
    },
    /// Plays a packet dump through the default output device
    Play {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        #[structopt(flatten)]
        stream: StreamOpts,
    },
}

#[derive(StructOpt)]
struct StreamOpts {
    #[structopt(long, default_value = "44100")]
    sample_rate: u32,
    #[structopt(long, default_value = "2")]
    channels: u16,
    #[structopt(long)]
    block_align: u16,
    #[structopt(long, default_value = "0", parse(try_from_str = parse_u16))]
    decode_flags: u16,
    #[structopt(long, default_value = "0", parse(try_from_str = parse_int))]
    channel_mask: u32,
    /// Codec extradata as hex, overrides the flags and mask
    #[structopt(long)]
    extradata: Option<String>,
}

impl StreamOpts {
    fn codec_parameters(&self) -> Result<CodecParameters, Error> {
        match &self.extradata {
            Some(hex) => Ok(CodecParameters::from_extradata(
                self.sample_rate,
                self.channels,
                self.block_align,
                &parse_hex(hex)?,
            )?),
            None => Ok(CodecParameters {
                sample_rate: self.sample_rate,
                channels: self.channels,
                block_align: self.block_align,
                channel_mask: self.channel_mask,
                decode_flags: self.decode_flags,
                lossless: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_opts(args: &[&str]) -> Result<StreamOpts, structopt::clap::Error> {
        let mut argv = vec!["wmapro-decoder-cli", "play", "in.bin", "--block-align", "256"];
        argv.extend_from_slice(args);

        match Opts::from_iter_safe(argv)?.command {
            Command::Play { stream, .. } => Ok(stream),
            Command::Decode { stream, .. } => Ok(stream),
        }
    }

    #[test]
    fn decode_flags_must_fit_in_16_bits() {
        let stream = stream_opts(&["--decode-flags", "0x10E0"]).unwrap();
        assert_eq!(stream.codec_parameters().unwrap().decode_flags, 0x10E0);

        assert!(stream_opts(&["--decode-flags", "0x10000"]).is_err());
        assert!(stream_opts(&["--decode-flags", "65536"]).is_err());
    }

    #[test]
    fn help_lists_both_commands() {
        let err = match Opts::from_iter_safe(vec!["wmapro-decoder-cli", "--help"]) {
            Ok(_) => panic!("help did not short circuit"),
            Err(err) => err,
        };

        assert!(err.message.contains("Decodes a packet dump to raw s16le PCM"));
        assert!(err.message.contains("Plays a packet dump through the default output device"));
    }

    #[test]
    fn parses_hex_extradata() {
        assert_eq!(parse_hex("10e0").unwrap(), vec![0x10, 0xE0]);
        assert!(parse_hex("abc").is_err());
    }
}
