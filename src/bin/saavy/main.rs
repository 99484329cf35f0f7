//! saavy - offline render of a small modular patch
//!
//! Run with: cargo run -- [midi-note]
//!
//! Builds keyboard → oscillator → envelope → delay → master with an LFO on
//! the oscillator's FM input, plays one note through the sample-accurate
//! scheduler and prints level and pitch of the result.
//! Set `RUST_LOG=saavy_modular=debug` to watch the graph being compiled.

mod analysis;

use std::sync::Arc;

use color_eyre::eyre::{eyre, WrapErr};
use saavy_modular::{
    catalog::Catalog,
    graph::{link::Link, MASTER_ID},
    io::{converter::midi_note_to_freq, AudioOutput},
    units::{delay, envelope, keyboard, lfo, master, oscillator, UnitKind},
    Engine, EngineConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use analysis::Analyzer;

const BLOCK_SIZE: usize = 256;
const FFT_SIZE: usize = 8192;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let note: u8 = match std::env::args().nth(1) {
        Some(arg) => arg.parse().wrap_err_with(|| format!("`{arg}` is not a MIDI note"))?,
        None => 57,
    };
    if note > 127 {
        return Err(eyre!("MIDI note {note} is out of range"));
    }

    let config = EngineConfig::default().with_channels(1);
    let mut engine = Engine::new(config, Arc::new(Catalog::standard()))?;

    engine.edit(|inst| {
        inst.create_and_add_unit(UnitKind::Master)?;
        let kb = inst.create_and_add_unit(UnitKind::Keyboard)?;
        let osc = inst.create_and_add_unit(UnitKind::Oscillator)?;
        let env = inst.create_and_add_unit(UnitKind::Envelope)?;
        let echo = inst.create_and_add_unit(UnitKind::Delay)?;
        let vibrato = inst.create_and_add_unit(UnitKind::Lfo)?;

        inst.add_link(Link::between(kb, keyboard::PITCH, osc, oscillator::PITCH))?;
        inst.add_link(Link::between(kb, keyboard::GATE, env, envelope::GATE))?;
        inst.add_link(Link::between(osc, oscillator::OUT, env, envelope::IN))?;
        inst.add_link(Link::between(env, envelope::OUT, echo, delay::IN))?;
        inst.add_link(Link::between(echo, delay::OUT, MASTER_ID, master::IN))?;
        inst.add_link(
            Link::between(vibrato, lfo::OUT, osc, oscillator::FM).with_value(0.005),
        )?;

        inst.set_parameter(env, envelope::ATTACK, 0.01, 0.0, None)?;
        inst.set_parameter(env, envelope::RELEASE, 0.4, 0.0, None)?;
        inst.set_parameter(vibrato, lfo::RATE, 5.5, 0.0, None)?;
        Ok(())
    })?;
    info!(
        order = ?engine.sink().order(),
        sentinel = ?engine.sink().sentinel(),
        "patch compiled"
    );

    let sample_rate = config.sample_rate;
    let total = (sample_rate * 2.0) as usize;
    let release_at = (sample_rate * 0.8) as usize;
    let mut rendered = Vec::with_capacity(total);
    let mut block = AudioOutput::new(1, BLOCK_SIZE);

    engine.schedule(32, &[0x90, note, 110])?;
    let mut position = 0;
    while position < total {
        let frames = BLOCK_SIZE.min(total - position);
        if (position..position + frames).contains(&release_at) {
            engine.schedule(release_at - position, &[0x80, note, 0])?;
        }
        engine.process(&mut block, 0, frames)?;
        rendered.extend_from_slice(&block.buffers[0][..frames]);
        position += frames;
    }

    let mut analyzer = Analyzer::new(FFT_SIZE, sample_rate);
    let held = analyzer.analyze(&rendered[..FFT_SIZE.min(rendered.len())]);
    let tail = analyzer.analyze(&rendered[total - FFT_SIZE..]);

    println!("note {note} ({:.1} Hz expected)", midi_note_to_freq(note));
    println!(
        "  held     peak {:.3}  rms {:.3}  dominant {:.1} Hz",
        held.peak, held.rms, held.dominant
    );
    println!(
        "  tail     peak {:.3}  rms {:.3}",
        tail.peak, tail.rms
    );
    println!("  voices sounding at end: {}", engine.poly().sounding_count());
    Ok(())
}
