use std::sync::Arc;

use saavy_modular::{
    catalog::Catalog,
    graph::{instrument::Instrument, link::Link, sink::Sink, UnitId, MASTER_ID},
    io::AudioOutput,
    param::ValueShaper,
    synth::{
        poly::{PolySettings, Polyphony},
        voice::VoiceState,
    },
    units::{self, envelope, master, oscillator, UnitKind},
    Engine, EngineConfig, Error, MAX_VOICES,
};

fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::standard())
}

fn poly(num_voices: usize, num_unison: usize) -> Polyphony {
    Polyphony::new(PolySettings {
        num_voices,
        num_unison,
        ..PolySettings::default()
    })
    .unwrap()
}

#[test]
fn created_units_match_their_descriptors() {
    let catalog = catalog();
    for kind in UnitKind::ALL {
        let unit = units::create(kind, UnitId(3), &catalog).unwrap();
        let descriptor = catalog.get(kind).unwrap();
        assert_eq!(unit.kind(), kind);
        assert_eq!(unit.inputs().len(), descriptor.inputs.len(), "{kind}");
        assert_eq!(unit.outputs().len(), descriptor.outputs.len(), "{kind}");
        assert_eq!(unit.params().len(), descriptor.params.len(), "{kind}");

        let by_name = units::create_named(kind.name(), UnitId(4), &catalog).unwrap();
        assert_eq!(by_name.kind(), kind);
    }
    assert!(matches!(
        units::create_named("wavetable", UnitId(1), &catalog),
        Err(Error::UnknownKind(_))
    ));
}

#[test]
fn master_only_instrument_renders_zeros() {
    let mut inst = Instrument::new(catalog());
    inst.create_and_add_unit(UnitKind::Master).unwrap();
    inst.init(44_100.0);
    let mut sink = Sink::new(110);
    sink.compile(&inst);
    assert!(sink.order().is_empty());

    let mut poly = poly(inst.num_voices(), 1);
    poly.note_on(60.0, 1.0, &mut inst);
    for frames in [1, 64, 333, 1024] {
        let mut output = AudioOutput::new(2, frames);
        sink.process(&mut inst, &mut poly, &mut output, 0, frames)
            .unwrap();
        assert!(output.buffers.iter().flatten().all(|s| *s == 0.0));
    }
}

#[test]
fn chain_compiles_source_first_for_any_insertion_order() {
    for reversed in [false, true] {
        let mut inst = Instrument::new(catalog());
        inst.create_and_add_unit(UnitKind::Master).unwrap();
        let (a, b) = if reversed {
            let env = inst.create_and_add_unit(UnitKind::Envelope).unwrap();
            let osc = inst.create_and_add_unit(UnitKind::Oscillator).unwrap();
            (osc, env)
        } else {
            let osc = inst.create_and_add_unit(UnitKind::Oscillator).unwrap();
            let env = inst.create_and_add_unit(UnitKind::Envelope).unwrap();
            (osc, env)
        };
        let to_master = Link::between(b, envelope::OUT, MASTER_ID, master::IN);
        let to_env = Link::between(a, oscillator::OUT, b, envelope::IN);
        if reversed {
            inst.add_link(to_master).unwrap();
            inst.add_link(to_env).unwrap();
        } else {
            inst.add_link(to_env).unwrap();
            inst.add_link(to_master).unwrap();
        }

        let mut sink = Sink::new(110);
        sink.compile(&inst);
        assert_eq!(sink.order(), &[a, b, MASTER_ID]);
    }
}

#[test]
fn note_on_and_off_move_one_voice() {
    let mut poly = poly(4, 1);
    poly.note_on(60.0, 1.0, &mut ());
    assert_eq!(poly.sounding_count(), 1);
    let on: Vec<_> = poly
        .voices()
        .iter()
        .filter(|v| v.state() == VoiceState::NoteOn)
        .collect();
    assert_eq!(on.len(), 1);
    assert_eq!(on[0].pitch(), 60.0);
    let on_id = on[0].id();

    poly.note_off(60.0, &mut ());
    assert_eq!(poly.voices()[on_id].state(), VoiceState::NoteOff);

    // With hold the released voice is kept in Hold instead.
    let mut held = self::poly(4, 1);
    held.set_hold(true, &mut ());
    held.note_on(60.0, 1.0, &mut ());
    held.note_off(60.0, &mut ());
    assert_eq!(held.voices()[0].state(), VoiceState::Hold);
}

#[test]
fn unison_groups_and_oldest_first_stealing() {
    let mut poly = poly(4, 3);
    let spread = poly.settings().unison_spread;
    poly.note_on(60.0, 1.0, &mut ());

    let group = poly.voices()[0].unison_group();
    let mut pitches: Vec<f32> = poly
        .voices()
        .iter()
        .filter(|v| v.is_sounding())
        .inspect(|v| assert_eq!(v.unison_group(), group))
        .map(|v| v.pitch())
        .collect();
    pitches.sort_by(f32::total_cmp);
    assert_eq!(pitches.len(), 3);
    for (index, pitch) in pitches.iter().enumerate() {
        assert!((pitch - (60.0 + index as f32 * spread)).abs() < 1e-5);
    }

    // One free voice left: the second note takes it, then steals the two
    // oldest voices of the first note.
    let oldest: Vec<u64> = {
        let mut tags: Vec<u64> = poly.voices().iter().map(|v| v.tag()).collect();
        tags.sort_unstable();
        tags
    };
    poly.note_on(72.0, 1.0, &mut ());
    assert_eq!(poly.sounding_count(), 4);
    let survivors: Vec<_> = poly
        .voices()
        .iter()
        .filter(|v| v.pitch() < 70.0)
        .collect();
    assert_eq!(survivors.len(), 1);
    // The free slot had tag 0; after it the two smallest first-note tags go.
    assert_eq!(survivors[0].tag(), oldest[3]);
}

#[test]
fn stealing_picks_the_minimum_tag() {
    let mut poly = poly(3, 1);
    for pitch in [60.0, 62.0, 64.0] {
        poly.note_on(pitch, 1.0, &mut ());
    }
    for round in 0..6 {
        let victim = poly
            .voices()
            .iter()
            .min_by_key(|v| v.tag())
            .map(|v| v.id())
            .unwrap();
        let pitch = 70.0 + round as f32;
        poly.note_on(pitch, 1.0, &mut ());
        assert_eq!(poly.voices()[victim].pitch(), pitch);
    }
}

#[test]
fn shaper_curves_invert() {
    for factor in [-2.0, -1.0, -0.5, 0.0, 0.5, 1.0, 2.0] {
        let shaper = ValueShaper::new(0.01, 20.0, 0, factor);
        for step in 0..=20 {
            let v = 0.01 + (20.0 - 0.01) * step as f32 / 20.0;
            let back = shaper.linear(shaper.exponential(v));
            assert!((back - v).abs() < 2e-3 * 20.0, "factor {factor}: {v} -> {back}");
        }
    }
}

#[test]
fn voice_count_changes_resize_every_unit() {
    let config = EngineConfig::default().with_channels(1);
    let mut engine = Engine::new(config, catalog()).unwrap();
    engine
        .edit(|inst| {
            inst.create_and_add_unit(UnitKind::Master)?;
            let osc = inst.create_and_add_unit(UnitKind::Oscillator)?;
            let env = inst.create_and_add_unit(UnitKind::Envelope)?;
            inst.add_link(Link::between(osc, oscillator::OUT, env, envelope::IN))?;
            inst.add_link(Link::between(env, envelope::OUT, MASTER_ID, master::IN))
        })
        .unwrap();

    let mut output = AudioOutput::new(1, 32);
    for num_voices in [1, 2, 7, 64, MAX_VOICES, 3] {
        engine.set_num_voices(num_voices).unwrap();
        assert_eq!(engine.poly().num_voices(), num_voices);
        for unit in engine.instrument().units() {
            assert_eq!(unit.num_voices(), num_voices);
            assert_eq!(unit.bank().num_voices(), num_voices);
            for port in unit.outputs() {
                assert_eq!(port.num_voices(), num_voices);
                for connection in port.connections() {
                    assert_eq!(connection.num_voices(), num_voices);
                }
            }
        }
        engine.handle_midi_message(&[0x90, 60, 100]).unwrap();
        engine.process(&mut output, 0, 32).unwrap();
    }
    assert_eq!(
        engine.set_num_voices(MAX_VOICES + 1),
        Err(Error::VoiceCount(MAX_VOICES + 1))
    );
}
