//! Benchmarks for complete patches running through the engine.
//!
//! These measure the whole per-sample path: control ticks, unit entry
//! points, link delivery and the voice adapters.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion};
use saavy_modular::{
    catalog::Catalog,
    graph::{link::Link, MASTER_ID},
    io::AudioOutput,
    units::{delay, envelope, keyboard, lfo, master, oscillator, UnitKind},
    Engine, EngineConfig,
};

use crate::BLOCK_SIZES;

/// keyboard → osc → env → delay → master, LFO on FM.
fn patch(num_voices: usize) -> Engine {
    let config = EngineConfig::default().with_voices(num_voices);
    let mut engine = Engine::new(config, Arc::new(Catalog::standard())).unwrap();
    engine
        .edit(|inst| {
            inst.create_and_add_unit(UnitKind::Master)?;
            let kb = inst.create_and_add_unit(UnitKind::Keyboard)?;
            let osc = inst.create_and_add_unit(UnitKind::Oscillator)?;
            let env = inst.create_and_add_unit(UnitKind::Envelope)?;
            let echo = inst.create_and_add_unit(UnitKind::Delay)?;
            let mod_lfo = inst.create_and_add_unit(UnitKind::Lfo)?;
            inst.add_link(Link::between(kb, keyboard::PITCH, osc, oscillator::PITCH))?;
            inst.add_link(Link::between(osc, oscillator::OUT, env, envelope::IN))?;
            inst.add_link(Link::between(env, envelope::OUT, echo, delay::IN))?;
            inst.add_link(Link::between(echo, delay::OUT, MASTER_ID, master::IN))?;
            inst.add_link(Link::between(mod_lfo, lfo::OUT, osc, oscillator::FM).with_value(0.01))
        })
        .unwrap();
    engine
}

pub fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/engine");

    for &size in BLOCK_SIZES {
        let mut output = AudioOutput::new(2, size);

        // One held note: baseline cost of the graph
        let mut single = patch(8);
        single.handle_midi_message(&[0x90, 57, 100]).unwrap();
        group.bench_with_input(BenchmarkId::new("single_voice", size), &size, |b, _| {
            b.iter(|| single.process(black_box(&mut output), 0, size).unwrap())
        });

        // Full chord on every voice
        let mut chord = patch(8);
        for key in [48, 52, 55, 59, 62, 65, 69, 72] {
            chord.handle_midi_message(&[0x90, key, 100]).unwrap();
        }
        group.bench_with_input(BenchmarkId::new("eight_voices", size), &size, |b, _| {
            b.iter(|| chord.process(black_box(&mut output), 0, size).unwrap())
        });

        // Wide pool, 4-voice unison stack per note
        let mut unison = patch(32);
        unison.set_unison(4, 0.1);
        for key in [45, 57, 64, 69] {
            unison.handle_midi_message(&[0x90, key, 100]).unwrap();
        }
        group.bench_with_input(BenchmarkId::new("unison_16", size), &size, |b, _| {
            b.iter(|| unison.process(black_box(&mut output), 0, size).unwrap())
        });
    }

    group.finish();
}

pub fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/compile");
    let mut engine = patch(8);

    // connect_modules + sink compile on every edit
    group.bench_function("edit_rebuild", |b| {
        b.iter(|| engine.edit(|_| Ok(())).unwrap())
    });

    group.finish();
}
