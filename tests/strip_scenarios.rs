use std::time::Duration;

use smart_leds::{SmartLedsWrite, RGB8};
use ws281x_pwm::transport::SimulatedPeripheral;
use ws281x_pwm::{
    ChannelConfig, ConfigError, DeviceConfig, Error, ResourceKind, Strip, StripController,
    StripType, TransmissionFault,
};

fn short_timeout() -> DeviceConfig {
    DeviceConfig::new().with_wait_timeout(Duration::from_millis(20))
}

#[test]
fn init_fini_reinit() {
    let sim = SimulatedPeripheral::new();
    let mut strip = Strip::new(sim.clone());
    strip.init(18, 8, 255).unwrap();
    assert!(sim.is_claimed());
    assert_eq!(strip.len(), 8);

    strip.fini();
    assert!(!sim.is_claimed());
    assert!(!strip.is_initialized());
    strip.fini();

    strip.init(18, 8, 255).unwrap();
    assert_eq!(sim.claims(), 2);
}

#[test]
fn operations_need_init() {
    let mut strip = Strip::new(SimulatedPeripheral::new());
    assert!(matches!(strip.render(), Err(Error::NotInitialized)));
    assert!(matches!(strip.wait(), Err(Error::NotInitialized)));
    assert!(matches!(strip.set_led(0, 1), Err(Error::NotInitialized)));
    assert!(matches!(strip.led(0), Err(Error::NotInitialized)));
    assert!(matches!(strip.clear(), Err(Error::NotInitialized)));
    assert_eq!(strip.len(), 0);
}

#[test]
fn set_render_decode_with_brightness() {
    let sim = SimulatedPeripheral::new();
    let mut strip = Strip::new(sim.clone());
    strip.init(18, 4, 128).unwrap();
    strip.set_led(0, 0x00ff_8040).unwrap();
    strip.set_led(3, 0x0000_00ff).unwrap();
    strip.render().unwrap();
    strip.wait().unwrap();

    assert_eq!(strip.led(0).unwrap(), 0x00ff_8040);
    assert_eq!(
        sim.decoded(0, StripType::Grb).unwrap(),
        vec![0x0080_4020, 0, 0, 0x0000_0080]
    );
}

#[test]
fn sixteen_dim_blue_leds_on_gpio18() {
    let sim = SimulatedPeripheral::new();
    let mut strip = Strip::new(sim.clone());
    strip.init(18, 16, 255).unwrap();
    strip.set_bitmap(&[0x0000_0020; 16]).unwrap();
    strip.render().unwrap();
    strip.wait().unwrap();

    let words = sim.lane_words(0);
    // 16 LEDs * 24 bits * 3 symbols, then 132 reset bits, in whole words
    assert_eq!(words.len(), 41);
    assert_eq!(&words[..4], &[0x9249_2492, 0x4924_9349, 0x2492_4924, 0x9249_2493]);
    assert!(words[36..].iter().all(|w| *w == 0));
    assert_eq!(sim.decoded(0, StripType::Grb).unwrap(), vec![0x20; 16]);
    assert!(sim.lane_words(1).iter().all(|w| *w == 0));
}

#[test]
fn clear_zeroes_and_renders() {
    let sim = SimulatedPeripheral::new();
    let mut strip = Strip::new(sim.clone());
    strip.init(12, 3, 255).unwrap();
    strip.set_bitmap(&[0x00ff_0000, 0x0000_ff00, 0x0000_00ff]).unwrap();
    strip.render().unwrap();
    strip.wait().unwrap();

    strip.clear().unwrap();
    assert!((0..3).all(|i| strip.led(i).unwrap() == 0));
    strip.wait().unwrap();
    assert_eq!(sim.frames_sent(), 2);
    assert_eq!(sim.decoded(0, StripType::Grb).unwrap(), vec![0, 0, 0]);
}

#[test]
fn render_twice_without_wait() {
    let sim = SimulatedPeripheral::new().with_transfer_time(Duration::from_secs(60));
    let mut strip = Strip::with_device_config(sim, short_timeout());
    strip.init(18, 4, 255).unwrap();
    strip.render().unwrap();

    let err = strip.render().unwrap_err();
    assert!(matches!(
        err,
        Error::Transmission(TransmissionFault::FrameInFlight)
    ));
    assert_eq!(err.code(), -28124);
}

#[test]
fn bitmap_length_mismatch_keeps_buffer() {
    let mut strip = Strip::new(SimulatedPeripheral::new());
    strip.init(18, 3, 255).unwrap();
    strip.set_bitmap(&[1, 2, 3]).unwrap();

    assert!(matches!(
        strip.set_bitmap(&[9, 9]),
        Err(Error::LengthMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert!(strip.set_bitmap(&[9; 4]).is_err());
    assert_eq!(
        (0..3).map(|i| strip.led(i).unwrap()).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[test]
fn zero_leds_is_a_config_error() {
    let sim = SimulatedPeripheral::new();
    let mut strip = Strip::new(sim.clone());
    assert!(matches!(
        strip.init(18, 0, 255),
        Err(Error::Config(ConfigError::ZeroPixels { channel: 0 }))
    ));
    assert!(!strip.is_initialized());
    assert_eq!(sim.claims(), 0);
}

#[test]
fn double_init_is_busy() {
    let sim = SimulatedPeripheral::new();
    let mut first = Strip::new(sim.clone());
    let mut second = Strip::new(sim.clone());
    first.init(18, 4, 255).unwrap();

    assert!(matches!(second.init(18, 4, 255), Err(Error::HardwareBusy)));
    assert!(matches!(first.init(18, 4, 255), Err(Error::HardwareBusy)));
    assert!(first.is_initialized());

    first.fini();
    second.init(18, 4, 255).unwrap();
}

#[test]
fn stalled_dma_times_out() {
    let sim = SimulatedPeripheral::new().stalled();
    let mut strip = Strip::with_device_config(sim.clone(), short_timeout());
    strip.init(18, 4, 255).unwrap();
    strip.render().unwrap();

    match strip.wait() {
        Err(Error::Timeout { waited }) => assert!(waited >= Duration::from_millis(20)),
        other => panic!("expected timeout, got {other:?}"),
    }
    strip.fini();
    assert!(!sim.is_claimed());
}

#[test]
fn resource_failure_reports_step() {
    let sim = SimulatedPeripheral::new();
    sim.fail_next_claim(ResourceKind::MailboxOpen);
    let mut strip = Strip::new(sim.clone());

    let err = strip.init(18, 4, 255).unwrap_err();
    assert!(matches!(
        err,
        Error::Resource {
            kind: ResourceKind::MailboxOpen,
            ..
        }
    ));
    assert_eq!(err.code(), -28112);
    strip.init(18, 4, 255).unwrap();
}

#[test]
fn two_channels_share_one_transfer() {
    let sim = SimulatedPeripheral::new();
    let channels = [
        ChannelConfig::new(18, 3),
        ChannelConfig::new(13, 5)
            .with_strip_type(StripType::Grbw)
            .with_brightness(255),
    ];
    let mut controller = StripController::init(&sim, DeviceConfig::new(), &channels).unwrap();
    assert_eq!(controller.channel_count(), 2);

    controller.set_pixel(0, 2, 0x0012_3456).unwrap();
    controller.set_pixel(1, 4, 0xff00_0001).unwrap();
    controller.render().unwrap();
    controller.wait().unwrap();

    assert_eq!(sim.decoded(0, StripType::Grb).unwrap(), vec![0, 0, 0x0012_3456]);
    assert_eq!(
        sim.decoded(1, StripType::Grbw).unwrap(),
        vec![0, 0, 0, 0, 0xff00_0001]
    );
    let layout = sim.layout().unwrap();
    assert_eq!(layout.lanes.len(), 2);
    assert_eq!(sim.lane_words(0).len(), sim.lane_words(1).len());

    drop(controller);
    assert!(!sim.is_claimed());
}

#[test]
fn pwm1_pin_alone_drives_lane_one() {
    let sim = SimulatedPeripheral::new();
    let mut controller =
        StripController::init(&sim, DeviceConfig::new(), &[ChannelConfig::new(13, 4)]).unwrap();
    controller
        .set_bitmap(0, &[0x0011_2233, 0, 0, 0x00ff_ffff])
        .unwrap();
    controller.render().unwrap();
    controller.wait().unwrap();

    assert_eq!(sim.layout().unwrap().lanes[0].pwm, 1);
    assert!(sim.lane_words(0).iter().all(|w| *w == 0));
    assert_eq!(
        sim.decoded(1, StripType::Grb).unwrap(),
        vec![0x0011_2233, 0, 0, 0x00ff_ffff]
    );
}

#[test]
fn channel_order_does_not_swap_lanes() {
    let sim = SimulatedPeripheral::new();
    let channels = [ChannelConfig::new(13, 1), ChannelConfig::new(18, 2)];
    let mut controller = StripController::init(&sim, DeviceConfig::new(), &channels).unwrap();
    controller.set_pixel(0, 0, 0x0000_0013).unwrap();
    controller.set_pixel(1, 1, 0x0000_0018).unwrap();
    controller.render().unwrap();
    controller.wait().unwrap();

    assert_eq!(sim.decoded(1, StripType::Grb).unwrap(), vec![0x13]);
    assert_eq!(sim.decoded(0, StripType::Grb).unwrap(), vec![0, 0x18]);
}

#[test]
fn two_pins_on_one_pwm_channel_rejected() {
    let sim = SimulatedPeripheral::new();
    let channels = [ChannelConfig::new(12, 3), ChannelConfig::new(18, 3)];
    assert!(matches!(
        StripController::init(&sim, DeviceConfig::new(), &channels),
        Err(Error::Config(ConfigError::SharedPwmChannel { pin: 18, pwm: 0 }))
    ));
    assert_eq!(sim.claims(), 0);
}

#[test]
fn dma_fault_reported_then_recovered() {
    let sim = SimulatedPeripheral::new();
    let mut strip = Strip::new(sim.clone());
    strip.init(18, 2, 255).unwrap();
    strip.set_led(1, 0x0000_ff00).unwrap();

    sim.fail_next_transfer(0x0000_0010);
    strip.render().unwrap();
    let err = strip.wait().unwrap_err();
    assert!(matches!(
        err,
        Error::Transmission(TransmissionFault::Dma { debug: 0x10 })
    ));
    assert_eq!(err.code(), -28125);

    strip.render().unwrap();
    strip.wait().unwrap();
    assert_eq!(sim.decoded(0, StripType::Grb).unwrap(), vec![0, 0x0000_ff00]);
}

#[test]
fn mixed_frequencies_rejected() {
    let sim = SimulatedPeripheral::new();
    let channels = [
        ChannelConfig::new(18, 3),
        ChannelConfig::new(13, 3).with_frequency(fugit::HertzU32::from_raw(400_000)),
    ];
    assert!(matches!(
        StripController::init(&sim, DeviceConfig::new(), &channels),
        Err(Error::Config(ConfigError::MixedFrequencies))
    ));
}

#[test]
fn smart_leds_write_pads_with_black() {
    let sim = SimulatedPeripheral::new();
    let mut strip = Strip::new(sim.clone());
    strip.init(18, 4, 255).unwrap();

    let colors = [RGB8::new(1, 2, 3), RGB8::new(0x10, 0x20, 0x30)];
    strip.write(colors.iter().copied()).unwrap();
    strip.write(colors.iter().copied()).unwrap();
    strip.wait().unwrap();

    assert_eq!(sim.frames_sent(), 2);
    assert_eq!(
        sim.decoded(0, StripType::Grb).unwrap(),
        vec![0x0001_0203, 0x0010_2030, 0, 0]
    );
}
