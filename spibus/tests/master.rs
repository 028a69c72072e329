use std::cell::RefCell;
use std::rc::Rc;

use spibus::{Edge, InvalidDataError, SimBus, SpiConfig, SpiMaster, SpiMode, SpiSignals};
use spibus_sim::{Digital, Error as SimError, Handle, Simulator};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fast_config(width: u32) -> SpiConfig {
    SpiConfig::builder()
        .word_width(width)
        .sclk_period(100)
        .frame_spacing(50)
        .build()
        .unwrap()
}

/// a master whose mosi is wired back into its own miso
fn looped_master(handle: &Handle, config: SpiConfig) -> (SpiMaster<SimBus>, SpiSignals) {
    let signals = SpiSignals::new(handle, &config);
    let bus = SimBus::new(handle.clone(), signals.sclk, signals.mosi, signals.mosi, signals.cs);
    (SpiMaster::new(bus, config, handle).unwrap(), signals)
}

#[test]
fn test_mode0_a5_trace() {
    init_logging();
    let config = SpiConfig::builder()
        .word_width(8)
        .mode(SpiMode::Mode0)
        .msb_first(true)
        .build()
        .unwrap();
    let mut sim = Simulator::new();
    let handle = sim.handle();
    let signals = SpiSignals::new(&handle, &config);
    let master = SpiMaster::new(signals.master(&handle), config, &handle).unwrap();
    let mut cs_log = handle.logger(signals.cs);

    let sampled = Rc::new(RefCell::new(Vec::new()));
    {
        let watcher = handle.clone();
        let sampled = sampled.clone();
        sim.spawn(async move {
            loop {
                watcher.edge(signals.sclk, Edge::Rising).await;
                sampled
                    .borrow_mut()
                    .push((watcher.read(signals.mosi) as u8, watcher.read(signals.cs)));
            }
        })
        .unwrap();
    }

    let received = sim
        .run_until_complete(async move {
            master.submit_blocking([0xa5]).await.unwrap();
            master.retrieve(None)
        })
        .unwrap();

    let bits = sampled.borrow().iter().map(|(bit, _)| *bit).collect::<Vec<_>>();
    assert_eq!(bits, vec![1, 0, 1, 0, 0, 1, 0, 1]);
    // chip-select is active low and held for every sample
    assert!(sampled.borrow().iter().all(|(_, cs)| !cs));

    // miso idles high with nobody driving it
    assert_eq!(received, vec![0xff]);

    // 1 ns spacing, 8 bits at 25 MHz and the closing half period
    cs_log.collect_pending();
    assert_eq!(cs_log.log(), &[Digital::Lo(1_000), Digital::Hi(341_000)]);
    assert!(!handle.read(signals.sclk));
    assert!(handle.read(signals.mosi));
}

#[test]
fn test_round_trip_preserves_order() {
    init_logging();
    for count in [0usize, 1, 7] {
        let mut sim = Simulator::new();
        let handle = sim.handle();
        let (master, _) = looped_master(&handle, fast_config(12));

        let words = (0..count as u64)
            .map(|i| (i * 0x2b7 + 0x801) & 0xfff)
            .collect::<Vec<_>>();
        let expected = words.clone();

        let received = sim
            .run_until_complete(async move {
                master.submit_blocking(words).await.unwrap();
                master.retrieve(Some(count))
            })
            .unwrap();
        assert_eq!(received, expected);
    }
}

#[test]
fn test_word_range_boundary() {
    let sim = Simulator::new();
    let handle = sim.handle();

    for width in [1, 8, 16, 63] {
        let (master, _) = looped_master(&handle, fast_config(width));
        let limit = 1u64 << width;

        assert_eq!(
            master.submit([limit]),
            Err(InvalidDataError { index: 0, word: limit, width }),
        );
        assert!(master.tx_is_empty());
        assert_eq!(master.submit([limit - 1]), Ok(()));
        assert_eq!(master.pending_tx_count(), 1);
    }

    let (master, _) = looped_master(&handle, fast_config(64));
    assert_eq!(master.submit([u64::MAX]), Ok(()));
}

#[test]
fn test_reset_on_idle_master_changes_nothing() {
    let mut sim = Simulator::new();
    let handle = sim.handle();
    let (master, signals) = looped_master(&handle, fast_config(8));
    let mut loggers = [signals.sclk, signals.mosi, signals.cs].map(|sig| handle.logger(sig));

    master.reset();
    master.reset();
    sim.run_for(1_000);

    for logger in loggers.iter_mut() {
        logger.collect_pending();
        assert!(logger.log().is_empty());
    }
    assert!(master.is_idle());
    assert_eq!(master.pending_tx_count(), 0);
    assert_eq!(master.pending_rx_count(), 0);
    assert_eq!(master.ignored_rx_count(), 0);
}

#[test]
fn test_reset_aborts_frame_in_flight() {
    init_logging();
    let config = fast_config(8);
    let mut sim = Simulator::new();
    let handle = sim.handle();
    let signals = SpiSignals::new(&handle, &config);
    let master = Rc::new(SpiMaster::new(signals.master(&handle), config, &handle).unwrap());
    let mut cs_log = handle.logger(signals.cs);

    {
        let master = master.clone();
        let timer = handle.clone();
        sim.spawn(async move {
            // three bits into the first frame
            timer.delay(50 + 3 * 100).await;
            master.reset();
        })
        .unwrap();
    }

    let blocked = master.clone();
    let result = sim
        .run_until_complete(async move { blocked.submit_blocking([1, 2, 3]).await })
        .unwrap();
    assert_eq!(result, Ok(()));
    assert_eq!(sim.now(), 350);

    assert!(master.is_idle());
    assert!(handle.read(signals.cs));
    assert!(!handle.read(signals.sclk));
    assert!(handle.read(signals.mosi));

    sim.run_for(2_000);
    cs_log.collect_pending();
    assert_eq!(cs_log.log(), &[Digital::Lo(50), Digital::Hi(350)]);
    assert!(master.rx_is_empty());

    // the engine carries on after a reset
    let again = master.clone();
    let received = sim
        .run_until_complete(async move {
            again.submit([0x5a]).unwrap();
            again.retrieve_blocking(None).await
        })
        .unwrap();
    assert_eq!(received, vec![0xff]);
}

#[test]
fn test_dropping_master_mid_frame_idles_the_bus() {
    init_logging();
    let config = fast_config(8);
    let mut sim = Simulator::new();
    let handle = sim.handle();
    let signals = SpiSignals::new(&handle, &config);
    let master = SpiMaster::new(signals.master(&handle), config, &handle).unwrap();
    master.submit([0x00]).unwrap();

    // halfway through the high phase of the fifth bit
    sim.run_for(50 + 4 * 100 + 75);
    assert!(!handle.read(signals.cs));
    assert!(handle.read(signals.sclk));
    assert!(!handle.read(signals.mosi));

    drop(master);
    assert!(handle.read(signals.cs));
    assert!(!handle.read(signals.sclk));
    assert!(handle.read(signals.mosi));

    let mut loggers = [signals.sclk, signals.mosi, signals.cs].map(|sig| handle.logger(sig));
    sim.run_for(2_000);
    for logger in loggers.iter_mut() {
        logger.collect_pending();
        assert!(logger.log().is_empty());
    }
}

#[test]
fn test_queue_counts() {
    let mut sim = Simulator::new();
    let handle = sim.handle();
    let (master, _) = looped_master(&handle, fast_config(8));
    let master = Rc::new(master);

    master.submit([0x11, 0x22, 0x33]).unwrap();
    assert_eq!(master.pending_tx_count(), 3);
    assert!(master.rx_is_empty());
    assert!(!master.is_idle());

    let waiter = master.clone();
    sim.run_until_complete(async move { waiter.wait_idle().await }).unwrap();

    assert!(master.tx_is_empty());
    assert_eq!(master.pending_rx_count(), 3);
    assert!(!master.rx_is_empty());
    // received words still queued
    assert!(!master.is_idle());

    assert_eq!(master.retrieve(Some(2)), vec![0x11, 0x22]);
    assert_eq!(master.retrieve(Some(5)), vec![0x33]);
    assert_eq!(master.retrieve(None), Vec::<u64>::new());
    assert!(master.is_idle());
}

#[test]
fn test_submit_during_frame_appends_after_it() {
    init_logging();
    let mut sim = Simulator::new();
    let handle = sim.handle();
    let (master, _) = looped_master(&handle, fast_config(8));
    let master = Rc::new(master);

    master.submit([0x01]).unwrap();
    {
        let master = master.clone();
        let timer = handle.clone();
        sim.spawn(async move {
            timer.delay(420).await;
            master.submit([0x02, 0x03]).unwrap();
        })
        .unwrap();
    }

    let reader = master.clone();
    let received = sim
        .run_until_complete(async move { reader.retrieve_blocking(Some(3)).await })
        .unwrap();
    assert_eq!(received, vec![0x01, 0x02, 0x03]);
}

#[test]
fn test_retrieve_blocking_without_traffic_stalls() {
    let mut sim = Simulator::new();
    let handle = sim.handle();
    let (master, _) = looped_master(&handle, fast_config(8));

    let result = sim.run_until_complete(async move { master.retrieve_blocking(None).await });
    assert!(matches!(result, Err(SimError::Stalled(0))));
}

#[test]
fn test_ignored_words_stay_queued() {
    let config = SpiConfig::builder()
        .sclk_period(100)
        .frame_spacing(50)
        .ignore_rx_value(0xff)
        .build()
        .unwrap();
    let mut sim = Simulator::new();
    let handle = sim.handle();
    let signals = SpiSignals::new(&handle, &config);
    let master = Rc::new(SpiMaster::new(signals.master(&handle), config, &handle).unwrap());

    let writer = master.clone();
    sim.run_until_complete(async move { writer.submit_blocking([0x10, 0x20]).await })
        .unwrap()
        .unwrap();

    assert_eq!(master.ignored_rx_count(), 2);
    let received = master.retrieve(None);
    assert_eq!(received, vec![0xff, 0xff]);
    assert!(received.iter().all(|word| master.config().is_ignored(*word)));
}
