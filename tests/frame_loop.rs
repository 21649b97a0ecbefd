mod common;

use ash::vk;
use common::{Call, MockBackend, MockWindow, Scripted};
use ege::{
    engine::push_constant_for, Engine, EngineInfo, EngineState, Extent2D, GPUError, SurfaceStatus,
};

fn engine_with(image_count: usize) -> (Engine<MockBackend, MockWindow>, common::Shared) {
    let (backend, state) = MockBackend::new(image_count);
    let window = MockWindow::new(800, 600);
    let engine = Engine::new(backend, window, &common::triangle(), &EngineInfo::default())
        .expect("engine should start");
    (engine, state)
}

#[test]
fn startup_builds_one_slot_per_image() {
    let (engine, state) = engine_with(3);
    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(engine.image_count(), 3);
    assert_eq!(engine.command_buffer_count(), engine.image_count());
    assert_eq!(engine.extent(), Some(Extent2D::new(800, 600)));

    let s = state.borrow();
    assert_eq!(
        s.calls,
        vec![
            Call::MakeModel(3),
            Call::MakeLayout,
            Call::WaitIdle,
            Call::MakeSwapChain {
                id: 1,
                extent: Extent2D::new(800, 600),
                previous: None,
                image_count: 3,
            },
            Call::Allocate(3),
            Call::MakePipeline { chain: 1 },
        ]
    );
}

#[test]
fn first_frame_records_one_pass_with_four_draws() {
    let (mut engine, state) = engine_with(3);
    state.borrow_mut().calls.clear();

    engine.draw_frame().unwrap();

    let s = state.borrow();
    let extent = Extent2D::new(800, 600);
    let mut expected = vec![
        Call::Acquire { chain: 1 },
        Call::BeginRecording(0),
        Call::BeginRenderPass {
            cmd: 0,
            chain: 1,
            image: 0,
        },
        Call::SetViewport(extent),
        Call::SetScissor(extent),
        Call::BindPipeline { chain: 1 },
        Call::BindModel,
    ];
    for i in 0..4 {
        expected.push(Call::PushConstants(push_constant_for(1, i)));
        expected.push(Call::Draw);
    }
    expected.extend([
        Call::EndRenderPass,
        Call::EndRecording(0),
        Call::Submit {
            chain: 1,
            cmd: 0,
            image: 0,
        },
    ]);
    assert_eq!(s.calls, expected);
    assert_eq!(engine.frame_counter(), 1);
}

#[test]
fn each_image_uses_its_own_slot() {
    let (mut engine, state) = engine_with(3);
    for _ in 0..4 {
        engine.draw_frame().unwrap();
    }
    let s = state.borrow();
    let submitted: Vec<(u64, u32)> = s
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::Submit { cmd, image, .. } => Some((*cmd, *image)),
            _ => None,
        })
        .collect();
    assert_eq!(submitted, vec![(0, 0), (1, 1), (2, 2), (0, 0)]);
}

#[test]
fn stale_acquire_skips_the_frame_and_rebuilds_once() {
    let (mut engine, state) = engine_with(3);
    state
        .borrow_mut()
        .acquire_script
        .push_back(Scripted::Status(SurfaceStatus::Stale));
    state.borrow_mut().calls.clear();

    engine.draw_frame().unwrap();

    let s = state.borrow();
    assert_eq!(s.submits(), 0);
    assert_eq!(s.count(|c| matches!(c, Call::BeginRecording(_))), 0);
    assert_eq!(s.swap_chains_built(), 1);
    assert!(s.calls.contains(&Call::MakeSwapChain {
        id: 2,
        extent: Extent2D::new(800, 600),
        previous: Some(1),
        image_count: 3,
    }));
    assert_eq!(engine.frame_counter(), 0);
    assert_eq!(engine.state(), EngineState::Running);
}

#[test]
fn suboptimal_acquire_still_renders() {
    let (mut engine, state) = engine_with(3);
    state
        .borrow_mut()
        .acquire_script
        .push_back(Scripted::Status(SurfaceStatus::Suboptimal));
    state.borrow_mut().calls.clear();

    engine.draw_frame().unwrap();

    let s = state.borrow();
    assert_eq!(s.submits(), 1);
    assert_eq!(s.swap_chains_built(), 0);
}

#[test]
fn suboptimal_present_rebuilds_after_submitting() {
    let (mut engine, state) = engine_with(3);
    state
        .borrow_mut()
        .present_script
        .push_back(Scripted::Status(SurfaceStatus::Suboptimal));
    state.borrow_mut().calls.clear();

    engine.draw_frame().unwrap();

    let s = state.borrow();
    let submit = s.position(|c| matches!(c, Call::Submit { .. })).unwrap();
    let rebuild = s.position(|c| matches!(c, Call::MakeSwapChain { .. })).unwrap();
    assert!(submit < rebuild);
    assert_eq!(s.swap_chains_built(), 1);
}

#[test]
fn stale_present_rebuilds() {
    let (mut engine, state) = engine_with(3);
    state
        .borrow_mut()
        .present_script
        .push_back(Scripted::Status(SurfaceStatus::Stale));

    engine.draw_frame().unwrap();

    assert_eq!(state.borrow().swap_chains_built(), 2);
    assert_eq!(engine.state(), EngineState::Running);
}

#[test]
fn resize_alone_triggers_rebuild() {
    let (mut engine, state) = engine_with(3);
    engine.window_mut().resize_to(1024, 768);
    state.borrow_mut().calls.clear();

    engine.draw_frame().unwrap();

    let s = state.borrow();
    assert_eq!(s.submits(), 1);
    assert!(s.calls.contains(&Call::MakeSwapChain {
        id: 2,
        extent: Extent2D::new(1024, 768),
        previous: Some(1),
        image_count: 3,
    }));
    drop(s);
    assert!(!engine.window().resized);
    assert_eq!(engine.extent(), Some(Extent2D::new(1024, 768)));

    state.borrow_mut().calls.clear();
    engine.draw_frame().unwrap();
    assert_eq!(state.borrow().swap_chains_built(), 0);
}

#[test]
fn steady_frames_never_rebuild() {
    let (mut engine, state) = engine_with(2);
    for _ in 0..10 {
        engine.draw_frame().unwrap();
    }
    let s = state.borrow();
    assert_eq!(s.swap_chains_built(), 1);
    assert_eq!(s.submits(), 10);
    assert_eq!(engine.frame_counter(), 10);
}

#[test]
fn out_of_range_index_is_rejected_before_recording() {
    let (mut engine, state) = engine_with(3);
    state.borrow_mut().acquire_script.push_back(Scripted::Index(5));

    let err = engine.draw_frame().unwrap_err();
    assert!(matches!(
        err,
        GPUError::ImageIndexOutOfRange { index: 5, count: 3 }
    ));
    let s = state.borrow();
    assert_eq!(s.count(|c| matches!(c, Call::BeginRecording(_))), 0);
    assert_eq!(s.submits(), 0);
}

#[test]
fn fatal_acquire_ends_the_run() {
    let (mut engine, state) = engine_with(3);
    {
        let mut s = state.borrow_mut();
        s.acquire_script.push_back(Scripted::Index(0));
        s.acquire_script
            .push_back(Scripted::Fail(vk::Result::ERROR_DEVICE_LOST));
    }

    let err = engine.run().unwrap_err();
    assert!(matches!(
        err,
        GPUError::AcquireError(vk::Result::ERROR_DEVICE_LOST)
    ));
    assert_eq!(engine.state(), EngineState::Stopped);

    let s = state.borrow();
    assert_eq!(s.submits(), 1);
    assert!(s.nothing_live());
}

#[test]
fn submit_failure_is_fatal() {
    let (mut engine, state) = engine_with(3);
    state
        .borrow_mut()
        .present_script
        .push_back(Scripted::Fail(vk::Result::ERROR_DEVICE_LOST));

    let err = engine.run().unwrap_err();
    assert!(matches!(err, GPUError::SubmitError(_)));
    assert_eq!(state.borrow().swap_chains_built(), 1);
    assert!(state.borrow().nothing_live());
}

#[test]
fn recording_failure_is_fatal() {
    let (mut engine, state) = engine_with(3);
    state.borrow_mut().fail_recording = true;

    let err = engine.draw_frame().unwrap_err();
    assert!(matches!(err, GPUError::RecordingError(_)));
    assert_eq!(state.borrow().submits(), 0);
}

#[test]
fn run_renders_until_close_then_releases_in_order() {
    let (mut engine, state) = engine_with(3);
    engine.window_mut().close_after_polls = Some(3);
    state.borrow_mut().calls.clear();

    engine.run().unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);

    let s = state.borrow();
    assert_eq!(s.submits(), 3);
    assert!(s.nothing_live());

    let tail: Vec<Call> = s
        .calls
        .iter()
        .skip_while(|c| !matches!(c, Call::WaitIdle))
        .cloned()
        .collect();
    assert_eq!(
        tail,
        vec![
            Call::WaitIdle,
            Call::DropPipeline { chain: 1 },
            Call::Free(3),
            Call::DropSwapChain(1),
            Call::DropModel,
            Call::DropLayout,
        ]
    );
}

#[test]
fn stop_is_idempotent_and_drop_does_not_release_twice() {
    let (mut engine, state) = engine_with(2);
    engine.stop().unwrap();
    engine.stop().unwrap();
    engine.draw_frame().unwrap();
    drop(engine);

    let s = state.borrow();
    assert_eq!(s.count(|c| matches!(c, Call::Acquire { .. })), 0);
    assert_eq!(s.count(|c| matches!(c, Call::Free(_))), 1);
    assert_eq!(s.count(|c| matches!(c, Call::DropSwapChain(_))), 1);
    assert_eq!(s.submits(), 0);
    assert!(s.nothing_live());
}

#[test]
fn dropping_a_running_engine_releases_everything() {
    let (mut engine, state) = engine_with(3);
    engine.draw_frame().unwrap();
    drop(engine);

    let s = state.borrow();
    assert!(s.nothing_live());
    let wait = s.calls.iter().rposition(|c| *c == Call::WaitIdle).unwrap();
    let pipeline = s
        .position(|c| matches!(c, Call::DropPipeline { .. }))
        .unwrap();
    assert!(wait < pipeline);
}

#[test]
fn window_already_closed_runs_no_frames() {
    let (mut engine, state) = engine_with(3);
    engine.window_mut().close();
    engine.run().unwrap();
    assert_eq!(state.borrow().submits(), 0);
    assert_eq!(engine.window().polls, 0);
}

#[test]
fn slots_are_recorded_only_after_acquire_frees_them() {
    for image_count in [2, 3] {
        let (mut engine, state) = engine_with(image_count);
        for _ in 0..12 {
            engine.draw_frame().unwrap();
        }
        let s = state.borrow();
        assert_eq!(s.submits(), 12);
        assert_eq!(s.recorded_while_pending, 0);
    }
}

#[test]
fn acquire_precedes_recording_across_a_rebuild() {
    let (mut engine, state) = engine_with(3);
    engine.draw_frame().unwrap();
    engine.window_mut().resize_to(640, 480);
    for _ in 0..6 {
        engine.draw_frame().unwrap();
    }

    let s = state.borrow();
    assert_eq!(s.recorded_while_pending, 0);
    for (i, call) in s.calls.iter().enumerate() {
        if matches!(call, Call::BeginRecording(_)) {
            let acquire = s.calls[..i]
                .iter()
                .rposition(|c| matches!(c, Call::Acquire { .. }));
            let submit = s.calls[..i]
                .iter()
                .rposition(|c| matches!(c, Call::Submit { .. }));
            assert!(acquire > submit, "recording at {} did not follow an acquire", i);
        }
    }
}
