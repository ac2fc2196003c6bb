//! Master clock, clock domains and the scheduler that drives them.
//!
//! Everything ticks at the master crystal frequency. A clock domain is an
//! exact fraction `num / den` of that frequency, and the scheduler keeps
//! an integer accumulator per domain: each master tick adds `num`, and the
//! domain fires whenever the accumulator reaches `den`. No floating point
//! is involved, so two domains derived from the same crystal can never
//! drift relative to each other however long the machine runs.

use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::resource::ClockDomain;

/// A count of master clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::ops::Add for Ticks {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl core::ops::AddAssign for Ticks {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

/// Master clock configuration for a machine.
///
/// Each machine has one crystal that drives all timing. Components may run
/// at divided rates, but everything derives from this frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterClock {
    /// Crystal frequency in Hz (e.g. `21_477_272` for an NTSC NES).
    pub frequency_hz: u64,
}

impl MasterClock {
    #[must_use]
    pub const fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }
}

const fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// A clock rate as an exact fraction of the master clock, kept reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockRate {
    pub num: u64,
    pub den: u64,
}

impl ClockRate {
    /// The master clock itself.
    pub const MASTER: Self = Self { num: 1, den: 1 };

    /// `master / divisor`.
    #[must_use]
    pub const fn divided_by(divisor: u64) -> Self {
        Self::ratio(1, divisor)
    }

    /// `master * num / den`, reduced.
    #[must_use]
    pub const fn ratio(num: u64, den: u64) -> Self {
        let g = gcd(num, den);
        if g == 0 {
            return Self { num, den };
        }
        Self {
            num: num / g,
            den: den / g,
        }
    }

    /// The rate of a `rate_hz` oscillator driven from `master`.
    #[must_use]
    pub const fn from_hz(rate_hz: u64, master: MasterClock) -> Self {
        Self::ratio(rate_hz, master.frequency_hz)
    }

    /// A domain is schedulable if it has non-zero terms, does not run
    /// faster than the master clock, and its phase (below `2 * den`) fits
    /// in a `u64`.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0 && self.num <= self.den && self.den <= u64::MAX / 2
    }

    /// Derived frequency, for display.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate_hz(&self, master: MasterClock) -> f64 {
        master.frequency_hz as f64 * self.num as f64 / self.den as f64
    }
}

/// One clock domain fired during a master tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub device: DeviceId,
    /// Index of the domain among the device's own clock declarations.
    pub clock: usize,
}

/// Scheduling state of one declared domain.
#[derive(Debug, Clone)]
pub struct DomainState {
    pub device: DeviceId,
    pub clock: usize,
    pub name: String,
    pub rate: ClockRate,
    accumulator: u64,
    cycles: u64,
}

impl DomainState {
    /// Cycles this domain has completed.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Fractional progress towards the next cycle, in units of `1 / den`.
    #[must_use]
    pub fn residual(&self) -> u64 {
        self.accumulator
    }
}

/// Advances every declared domain by its share of each master tick.
#[derive(Debug, Clone)]
pub struct ClockScheduler {
    master: MasterClock,
    domains: Vec<DomainState>,
    elapsed: Ticks,
}

impl ClockScheduler {
    #[must_use]
    pub fn new(master: MasterClock) -> Self {
        Self {
            master,
            domains: Vec::new(),
            elapsed: Ticks::ZERO,
        }
    }

    #[must_use]
    pub fn master(&self) -> MasterClock {
        self.master
    }

    /// Add a domain. Domains fire in the order they were added, which the
    /// registry keeps equal to device registration order.
    pub fn add(&mut self, device: DeviceId, clock: usize, domain: &ClockDomain) {
        self.domains.push(DomainState {
            device,
            clock,
            name: domain.name.clone(),
            rate: domain.rate,
            accumulator: 0,
            cycles: 0,
        });
    }

    /// Advance one master tick, appending every domain that completed a
    /// cycle to `fired` in deterministic order.
    pub fn tick(&mut self, fired: &mut Vec<Fired>) {
        self.elapsed += Ticks(1);
        for domain in &mut self.domains {
            domain.accumulator += domain.rate.num;
            if domain.accumulator >= domain.rate.den {
                domain.accumulator -= domain.rate.den;
                domain.cycles += 1;
                fired.push(Fired {
                    device: domain.device,
                    clock: domain.clock,
                });
            }
        }
    }

    /// Master ticks elapsed since construction or the last reset.
    #[must_use]
    pub fn elapsed(&self) -> Ticks {
        self.elapsed
    }

    #[must_use]
    pub fn domains(&self) -> &[DomainState] {
        &self.domains
    }

    /// Look up a domain by owning device and domain name.
    #[must_use]
    pub fn domain(&self, device: DeviceId, name: &str) -> Option<&DomainState> {
        self.domains
            .iter()
            .find(|d| d.device == device && d.name == name)
    }

    /// Return every domain to power-on phase.
    pub fn reset(&mut self) {
        self.elapsed = Ticks::ZERO;
        for domain in &mut self.domains {
            domain.accumulator = 0;
            domain.cycles = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NTSC: MasterClock = MasterClock::new(21_477_272);

    fn domain(name: &str, rate: ClockRate) -> ClockDomain {
        ClockDomain {
            name: name.to_string(),
            rate,
        }
    }

    #[test]
    fn ratio_is_reduced() {
        assert_eq!(ClockRate::ratio(4, 48), ClockRate::divided_by(12));
        assert_eq!(
            ClockRate::from_hz(1_789_773, MasterClock::new(21_477_276)).den,
            12
        );
    }

    #[test]
    fn invalid_rates() {
        assert!(!ClockRate::ratio(0, 5).is_valid());
        assert!(!ClockRate { num: 1, den: 0 }.is_valid());
        assert!(!ClockRate::ratio(3, 2).is_valid());
        assert!(ClockRate::MASTER.is_valid());
        assert!(!ClockRate::ratio(u64::MAX - 1, u64::MAX).is_valid());
        assert!(ClockRate::divided_by(u64::MAX / 2).is_valid());
    }

    #[test]
    fn deserialized_rate_near_u64_limit_is_rejected() {
        let json = r#"{"num":18446744073709551614,"den":18446744073709551615}"#;
        let rate: ClockRate = serde_json::from_str(json).unwrap();
        assert!(!rate.is_valid());
    }

    #[test]
    fn largest_valid_rate_ticks_without_overflow() {
        let rate = ClockRate {
            num: u64::MAX / 2 - 1,
            den: u64::MAX / 2,
        };
        assert!(rate.is_valid());
        let mut sched = ClockScheduler::new(NTSC);
        sched.add(DeviceId(0), 0, &domain("edge", rate));
        let mut fired = Vec::new();
        for _ in 0..1000 {
            sched.tick(&mut fired);
        }
        assert_eq!(sched.domains()[0].cycles(), 999);
    }

    #[test]
    fn derived_frequency() {
        let cpu = ClockRate::divided_by(12).rate_hz(NTSC);
        assert!((cpu - 1_789_772.666).abs() < 0.01);
    }

    #[test]
    fn divided_domain_fires_every_nth_tick() {
        let mut sched = ClockScheduler::new(NTSC);
        sched.add(DeviceId(0), 0, &domain("ppu", ClockRate::divided_by(4)));
        let mut fired = Vec::new();
        for _ in 0..3 {
            sched.tick(&mut fired);
        }
        assert!(fired.is_empty());
        sched.tick(&mut fired);
        assert_eq!(
            fired,
            vec![Fired {
                device: DeviceId(0),
                clock: 0
            }]
        );
    }

    #[test]
    fn cpu_and_sequencer_domains_stay_phase_locked() {
        let mut sched = ClockScheduler::new(NTSC);
        sched.add(DeviceId(0), 0, &domain("clk", ClockRate::divided_by(12)));
        sched.add(
            DeviceId(0),
            1,
            &domain("seq_clk", ClockRate::divided_by(89_490)),
        );
        let mut fired = Vec::new();
        for _ in 0..89_490u64 * 12 {
            sched.tick(&mut fired);
            fired.clear();
        }
        let clk = sched.domain(DeviceId(0), "clk").unwrap();
        let seq = sched.domain(DeviceId(0), "seq_clk").unwrap();
        assert_eq!(clk.cycles(), 89_490);
        assert_eq!(seq.cycles(), 12);
        assert_eq!(clk.residual(), 0);
        assert_eq!(seq.residual(), 0);
        assert_eq!(sched.elapsed(), Ticks(89_490 * 12));
    }

    #[test]
    fn non_unit_ratio_is_exact() {
        // 3/7 of master: exactly 3 cycles per 7 ticks, forever.
        let mut sched = ClockScheduler::new(NTSC);
        sched.add(DeviceId(2), 0, &domain("odd", ClockRate::ratio(3, 7)));
        let mut fired = Vec::new();
        for _ in 0..7 * 1000 {
            sched.tick(&mut fired);
        }
        assert_eq!(fired.len(), 3000);
        assert_eq!(sched.domains()[0].residual(), 0);
    }

    #[test]
    fn same_tick_fires_in_registration_order() {
        let mut sched = ClockScheduler::new(NTSC);
        sched.add(DeviceId(0), 0, &domain("a", ClockRate::MASTER));
        sched.add(DeviceId(1), 0, &domain("b", ClockRate::MASTER));
        sched.add(DeviceId(1), 1, &domain("c", ClockRate::divided_by(2)));
        let mut fired = Vec::new();
        sched.tick(&mut fired);
        sched.tick(&mut fired);
        let order: Vec<_> = fired.iter().map(|f| (f.device.0, f.clock)).collect();
        assert_eq!(order, vec![(0, 0), (1, 0), (0, 0), (1, 0), (1, 1)]);
    }

    #[test]
    fn reset_returns_to_power_on_phase() {
        let mut sched = ClockScheduler::new(NTSC);
        sched.add(DeviceId(0), 0, &domain("clk", ClockRate::divided_by(12)));
        let mut fired = Vec::new();
        for _ in 0..30 {
            sched.tick(&mut fired);
        }
        sched.reset();
        assert_eq!(sched.elapsed(), Ticks::ZERO);
        assert_eq!(sched.domains()[0].cycles(), 0);
        assert_eq!(sched.domains()[0].residual(), 0);
    }
}
