//! bus capability
//!
//! engines never touch the simulator directly. they read and drive the four
//! SPI roles and wait on edges and durations through [`Bus`], so the same
//! engine code runs against any kernel that can provide those operations

use std::future::Future;

use spibus_sim::{Edge, Handle, Signal, Time};

use crate::SpiConfig;

/// the four lines of an SPI bus as seen from one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// sclk
    Clock,
    /// line this engine drives (mosi for a master, miso for a slave)
    DataOut,
    /// line this engine samples
    DataIn,
    /// cs
    ChipSelect,
}

pub trait Bus {
    /// current level of the line bound to `role`
    fn read(&self, role: Role) -> bool;

    /// drive the line bound to `role`
    fn write(&self, role: Role, value: bool);

    /// resolves on the next `edge` of the line bound to `role`
    fn wait_edge(&self, role: Role, edge: Edge) -> impl Future<Output = ()>;

    /// resolves once `duration` steps have elapsed
    fn wait_duration(&self, duration: Time) -> impl Future<Output = ()>;

    /// current simulation time
    fn now(&self) -> Time;
}

/// a [`Bus`] backed by signals of an `spibus_sim` kernel
#[derive(Clone)]
pub struct SimBus {
    handle: Handle,
    clock: Signal,
    data_out: Signal,
    data_in: Signal,
    chip_select: Signal,
}

impl SimBus {
    pub fn new(
        handle: Handle,
        clock: Signal,
        data_out: Signal,
        data_in: Signal,
        chip_select: Signal,
    ) -> Self {
        Self {
            handle,
            clock,
            data_out,
            data_in,
            chip_select,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn signal(&self, role: Role) -> Signal {
        match role {
            Role::Clock => self.clock,
            Role::DataOut => self.data_out,
            Role::DataIn => self.data_in,
            Role::ChipSelect => self.chip_select,
        }
    }
}

impl Bus for SimBus {
    fn read(&self, role: Role) -> bool {
        self.handle.read(self.signal(role))
    }

    fn write(&self, role: Role, value: bool) {
        self.handle.write(self.signal(role), value)
    }

    fn wait_edge(&self, role: Role, edge: Edge) -> impl Future<Output = ()> {
        self.handle.edge(self.signal(role), edge)
    }

    fn wait_duration(&self, duration: Time) -> impl Future<Output = ()> {
        self.handle.delay(duration)
    }

    fn now(&self) -> Time {
        self.handle.now()
    }
}

/// the four signals of one SPI bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSignals {
    pub sclk: Signal,
    pub mosi: Signal,
    pub miso: Signal,
    pub cs: Signal,
}

impl SpiSignals {
    /// create the bus signals resting at the idle levels of `config`
    pub fn new(handle: &Handle, config: &SpiConfig) -> Self {
        Self {
            sclk: handle.signal("sclk", config.cpol()),
            mosi: handle.signal("mosi", config.data_output_idle()),
            miso: handle.signal("miso", config.data_output_idle()),
            cs: handle.signal("cs", config.cs_level(false)),
        }
    }

    /// the bus as seen by a master: drives mosi, samples miso
    pub fn master(&self, handle: &Handle) -> SimBus {
        SimBus::new(handle.clone(), self.sclk, self.mosi, self.miso, self.cs)
    }

    /// the bus as seen by a slave: drives miso, samples mosi
    pub fn slave(&self, handle: &Handle) -> SimBus {
        SimBus::new(handle.clone(), self.sclk, self.miso, self.mosi, self.cs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spibus_sim::Simulator;

    #[test]
    fn test_roles_swap_between_ends() {
        let sim = Simulator::new();
        let handle = sim.handle();
        let config = SpiConfig::builder().cpol(true).build().unwrap();
        let signals = SpiSignals::new(&handle, &config);

        assert!(handle.read(signals.sclk));
        assert!(handle.read(signals.cs));

        let master = signals.master(&handle);
        let slave = signals.slave(&handle);
        master.write(Role::DataOut, false);
        assert!(!slave.read(Role::DataIn));
        assert!(slave.read(Role::DataOut));

        slave.write(Role::DataOut, false);
        assert!(!handle.read(signals.miso));
        assert_eq!(master.signal(Role::Clock), slave.signal(Role::Clock));
        assert_eq!(master.handle().name(master.signal(Role::DataOut)), "mosi");
        assert_eq!(slave.handle().name(slave.signal(Role::DataOut)), "miso");
    }
}
