#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::{Future, poll_fn};
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use embassy_time::{Duration, MockDriver, Timer};
use ftouch::config::{Capabilities, TouchConfig, ValidityConfig};
use ftouch::driver::TouchDriver;
use ftouch::error::TransportError;
use ftouch::event::ReportEvent;
use ftouch::ic::{ChipIdMap, ChipType};
use ftouch::platform::Platform;
use ftouch::sink::EventSink;
use ftouch::transport::{RegisterTransport, ResetLine};

// Init logger for tests
#[ctor::ctor]
pub fn init_log() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Virtual milliseconds a test may take before it is considered hung
const MAX_TEST_MILLIS: u32 = 600_000;

/// Block on `fut`, advancing the mock clock by one millisecond whenever it is pending.
pub fn test_block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let mut cx = Context::from_waker(Waker::noop());
    for _ in 0..MAX_TEST_MILLIS {
        if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
            return out;
        }
        MockDriver::get().advance(Duration::from_millis(1));
    }
    panic!("Test timeout reached");
}

pub const TOUCH_CMD: u8 = 0x01;
pub const CHIP_ID_REG: u8 = 0xA3;
pub const POWER_MODE_REG: u8 = 0xA5;
pub const FW_VERSION_REG: u8 = 0xA6;
pub const MODULE_ID_REG: u8 = 0xE3;
pub const BOOT_READ_ID: u8 = 0x90;

pub const FW_VERSION: u8 = 0x12;
pub const MODULE_ID: u8 = 0x3b;

pub const EVENT_DOWN: u8 = 0b00;
pub const EVENT_UP: u8 = 0b01;
pub const EVENT_CONTACT: u8 = 0b10;

/// Frame length with ten slots
pub const FRAME_LEN: usize = 2 + 6 * 10;

pub const FT8201: ChipType = ChipType {
    kind: 0x81,
    chip_idh: 0x82,
    chip_idl: 0x01,
    rom_idh: 0x82,
    rom_idl: 0x01,
    pb_idh: 0x82,
    pb_idl: 0xA1,
    bl_idh: 0x82,
    bl_idl: 0xA2,
};

pub const CHIP_TYPES: &[ChipType] = &[FT8201];
pub const CHIP_ID_MAPS: &[ChipIdMap] = &[ChipIdMap {
    kind: 0x81,
    chip_ids: &[0x8201, 0x8F01],
}];

pub fn test_config() -> TouchConfig {
    TouchConfig {
        chip_types: CHIP_TYPES,
        chip_id_maps: CHIP_ID_MAPS,
        validity: ValidityConfig {
            timeout: Duration::from_millis(50),
            interval: Duration::from_millis(10),
            ..Default::default()
        },
        pm_bus_timeout: Duration::from_millis(20),
        reset_settle: Duration::from_millis(1),
        ..Default::default()
    }
}

pub fn pen_config() -> TouchConfig {
    TouchConfig {
        capabilities: Capabilities {
            pen: true,
            ..Default::default()
        },
        ..test_config()
    }
}

/// A scripted touch data read.
#[derive(Debug, Clone)]
pub enum FrameRead {
    Data(Vec<u8>),
    /// The read fails after the controller wrote `first` into the first byte
    Fail { first: Option<u8> },
}

#[derive(Debug)]
pub struct BusState {
    pub frames: VecDeque<FrameRead>,
    /// Answers of the chip id register, `fallback_chip_id` once drained
    pub chip_ids: VecDeque<u8>,
    pub fallback_chip_id: Option<u8>,
    pub chip_id_reads: usize,
    pub boot_ids: VecDeque<[u8; 2]>,
    pub fallback_boot_id: [u8; 2],
    pub writes: Vec<Vec<u8>>,
    /// Delay applied to touch data reads
    pub read_delay: Option<Duration>,
}

impl Default for BusState {
    fn default() -> Self {
        Self {
            frames: VecDeque::new(),
            chip_ids: VecDeque::new(),
            fallback_chip_id: Some(FT8201.chip_idh),
            chip_id_reads: 0,
            boot_ids: VecDeque::new(),
            fallback_boot_id: [FT8201.rom_idh, FT8201.rom_idl],
            writes: Vec::new(),
            read_delay: None,
        }
    }
}

/// In-memory controller answering the register protocol.
pub struct FakeTransport {
    pub state: Rc<RefCell<BusState>>,
}

impl RegisterTransport for FakeTransport {
    async fn read_block(&mut self, cmd: &[u8], buf: &mut [u8]) -> Result<(), TransportError> {
        match cmd.first().copied() {
            Some(TOUCH_CMD) => {
                let delay = self.state.borrow().read_delay;
                if let Some(delay) = delay {
                    Timer::after(delay).await;
                }
                let read = self.state.borrow_mut().frames.pop_front();
                match read {
                    Some(FrameRead::Data(data)) => {
                        let len = data.len().min(buf.len());
                        buf[..len].copy_from_slice(&data[..len]);
                        Ok(())
                    }
                    Some(FrameRead::Fail { first }) => {
                        if let (Some(b), Some(slot)) = (first, buf.first_mut()) {
                            *slot = b;
                        }
                        Err(TransportError::Bus)
                    }
                    None => Err(TransportError::Nack),
                }
            }
            Some(CHIP_ID_REG) => {
                let mut state = self.state.borrow_mut();
                state.chip_id_reads += 1;
                let id = match state.chip_ids.pop_front() {
                    Some(id) => Some(id),
                    None => state.fallback_chip_id,
                };
                match id {
                    Some(id) => {
                        buf[0] = id;
                        Ok(())
                    }
                    None => Err(TransportError::Nack),
                }
            }
            Some(BOOT_READ_ID) => {
                let mut state = self.state.borrow_mut();
                let id = state.boot_ids.pop_front().unwrap_or(state.fallback_boot_id);
                let len = buf.len().min(2);
                buf[..len].copy_from_slice(&id[..len]);
                Ok(())
            }
            Some(FW_VERSION_REG) => {
                buf[0] = FW_VERSION;
                Ok(())
            }
            Some(MODULE_ID_REG) => {
                buf[0] = MODULE_ID;
                Ok(())
            }
            _ => Err(TransportError::Nack),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.state.borrow_mut().writes.push(data.to_vec());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ResetLog {
    pub pulses: usize,
    pub holds: usize,
}

pub struct FakeReset {
    pub log: Rc<RefCell<ResetLog>>,
}

impl ResetLine for FakeReset {
    async fn pulse(&mut self, _settle: Duration) {
        self.log.borrow_mut().pulses += 1;
    }

    fn hold(&mut self) {
        self.log.borrow_mut().holds += 1;
    }
}

#[derive(Debug, Default)]
pub struct PlatformLog {
    pub firmware_recovery: usize,
    pub mode_recovery: usize,
    pub gesture_suspend: usize,
    pub gesture_resume: usize,
    pub power_suspend: usize,
    pub power_resume: usize,
    pub restore_firmware: usize,
    /// Gesture payloads handed to the parser
    pub gestures: Vec<Vec<u8>>,
    pub accept_gesture: bool,
}

pub struct RecordingPlatform {
    pub log: Rc<RefCell<PlatformLog>>,
}

impl Platform for RecordingPlatform {
    fn request_firmware_recovery(&mut self) {
        self.log.borrow_mut().firmware_recovery += 1;
    }

    async fn mode_recovery(&mut self) {
        self.log.borrow_mut().mode_recovery += 1;
    }

    async fn try_parse_gesture(&mut self, data: &[u8]) -> bool {
        let mut log = self.log.borrow_mut();
        log.gestures.push(data.to_vec());
        log.accept_gesture
    }

    async fn gesture_suspend(&mut self) {
        self.log.borrow_mut().gesture_suspend += 1;
    }

    async fn gesture_resume(&mut self) {
        self.log.borrow_mut().gesture_resume += 1;
    }

    async fn power_suspend(&mut self) {
        self.log.borrow_mut().power_suspend += 1;
    }

    async fn power_resume(&mut self) {
        self.log.borrow_mut().power_resume += 1;
    }

    async fn restore_firmware(&mut self) {
        self.log.borrow_mut().restore_firmware += 1;
    }
}

/// Sink recording every batch it receives.
pub struct RecordingSink {
    pub batches: Rc<RefCell<Vec<Vec<ReportEvent>>>>,
}

impl EventSink for RecordingSink {
    async fn report_events(&mut self, events: &[ReportEvent]) {
        self.batches.borrow_mut().push(events.to_vec());
    }
}

pub type TestDriver = TouchDriver<FakeTransport, FakeReset, RecordingPlatform, RecordingSink>;

pub struct Fixture {
    pub driver: TestDriver,
    pub bus: Rc<RefCell<BusState>>,
    pub reset: Rc<RefCell<ResetLog>>,
    pub platform: Rc<RefCell<PlatformLog>>,
    pub batches: Rc<RefCell<Vec<Vec<ReportEvent>>>>,
}

impl Fixture {
    pub fn new(config: TouchConfig) -> Self {
        let bus = Rc::new(RefCell::new(BusState::default()));
        let reset = Rc::new(RefCell::new(ResetLog::default()));
        let platform = Rc::new(RefCell::new(PlatformLog::default()));
        let batches = Rc::new(RefCell::new(Vec::new()));
        let driver = TouchDriver::new(
            FakeTransport { state: bus.clone() },
            FakeReset { log: reset.clone() },
            RecordingPlatform { log: platform.clone() },
            RecordingSink {
                batches: batches.clone(),
            },
            config,
        );
        Self {
            driver,
            bus,
            reset,
            platform,
            batches,
        }
    }

    /// A fixture whose driver is probed, with the recorded history cleared.
    pub fn probed(config: TouchConfig) -> Self {
        let fixture = Self::new(config);
        test_block_on(fixture.driver.probe()).expect("probe failed");
        fixture.clear_history();
        fixture
    }

    pub fn clear_history(&self) {
        self.batches.borrow_mut().clear();
        *self.reset.borrow_mut() = ResetLog::default();
        let accept_gesture = self.platform.borrow().accept_gesture;
        *self.platform.borrow_mut() = PlatformLog {
            accept_gesture,
            ..Default::default()
        };
        let mut bus = self.bus.borrow_mut();
        bus.writes.clear();
        bus.chip_id_reads = 0;
    }

    pub fn push_frame(&self, frame: Vec<u8>) {
        self.bus.borrow_mut().frames.push_back(FrameRead::Data(frame));
    }

    pub fn push_read_failure(&self, first: Option<u8>) {
        self.bus.borrow_mut().frames.push_back(FrameRead::Fail { first });
    }

    pub fn pending_frames(&self) -> usize {
        self.bus.borrow().frames.len()
    }

    pub fn last_batch(&self) -> Vec<ReportEvent> {
        self.batches.borrow().last().cloned().unwrap_or_default()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.borrow().len()
    }

    pub fn occupancy(&self) -> u16 {
        test_block_on(self.driver.touch_state()).occupancy()
    }
}

/// One record of a touch frame.
#[derive(Debug, Clone, Copy)]
pub struct Record {
    pub event: u8,
    pub id: u8,
    pub x: u16,
    pub y: u16,
    pub palm: bool,
}

pub fn down(id: u8, x: u16, y: u16) -> Record {
    Record {
        event: EVENT_DOWN,
        id,
        x,
        y,
        palm: false,
    }
}

pub fn contact(id: u8, x: u16, y: u16) -> Record {
    Record {
        event: EVENT_CONTACT,
        id,
        x,
        y,
        palm: false,
    }
}

pub fn up(id: u8, x: u16, y: u16) -> Record {
    Record {
        event: EVENT_UP,
        id,
        x,
        y,
        palm: false,
    }
}

/// Build a frame declaring `count` points, unused records keep the end-of-list id.
pub fn frame_with_count(count: u8, records: &[Record]) -> Vec<u8> {
    let mut frame = vec![0xFF; FRAME_LEN];
    frame[0] = 0x00;
    frame[1] = count;
    for (i, r) in records.iter().enumerate() {
        let base = 2 + 6 * i;
        frame[base] = (r.event << 6) | ((r.palm as u8) << 4) | ((r.x >> 8) as u8 & 0x0F);
        frame[base + 1] = r.x as u8;
        frame[base + 2] = (r.id << 4) | ((r.y >> 8) as u8 & 0x0F);
        frame[base + 3] = r.y as u8;
        frame[base + 4] = 0x04;
        frame[base + 5] = 0x08;
    }
    frame
}

/// Build a frame whose point count matches the down records.
pub fn frame(records: &[Record]) -> Vec<u8> {
    let count = records.iter().filter(|r| r.event != EVENT_UP).count() as u8;
    frame_with_count(count, records)
}

/// Frame carrying the device error sentinel.
pub fn error_frame() -> Vec<u8> {
    let mut frame = vec![0x00; FRAME_LEN];
    frame[1..4].copy_from_slice(&[0xEF, 0xEF, 0xEF]);
    frame
}

/// Stylus frame with the tip down.
pub fn pen_frame(x: u16, y: u16, pressure: u16) -> Vec<u8> {
    let mut frame = vec![0x00; FRAME_LEN];
    frame[1] = 0xB0;
    frame[2] = 0x01 | 0x20;
    frame[3..5].copy_from_slice(&x.to_be_bytes());
    frame[5..7].copy_from_slice(&y.to_be_bytes());
    frame[7..9].copy_from_slice(&pressure.to_be_bytes());
    frame[9..11].copy_from_slice(&100u16.to_be_bytes());
    frame[11..13].copy_from_slice(&200u16.to_be_bytes());
    frame
}

/// Interrupt line that fires once per [`FakeIntPin::fire`].
#[derive(Clone, Default)]
pub struct FakeIntPin {
    pub edges: Rc<Cell<u32>>,
}

impl FakeIntPin {
    pub fn fire(&self) {
        self.edges.set(self.edges.get() + 1);
    }

    async fn next_edge(&mut self) -> Result<(), Infallible> {
        poll_fn(|_| {
            let edges = self.edges.get();
            if edges > 0 {
                self.edges.set(edges - 1);
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            }
        })
        .await
    }
}

impl embedded_hal::digital::ErrorType for FakeIntPin {
    type Error = Infallible;
}

impl embedded_hal_async::digital::Wait for FakeIntPin {
    async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
        self.next_edge().await
    }

    async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
        self.next_edge().await
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        self.next_edge().await
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
        self.next_edge().await
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
        self.next_edge().await
    }
}
