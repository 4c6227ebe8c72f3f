use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeOfDay {
    /// 7am through 9:59am
    MorningRush,
    /// 10am through 4:59pm
    Midday,
    /// 5pm through 7:59pm
    EveningRush,
    /// 8pm through 6:59am
    Overnight,
}

impl TimeOfDay {
    pub fn of(time: &NaiveDateTime) -> Self {
        match time.hour() {
            7..=9 => TimeOfDay::MorningRush,
            10..=16 => TimeOfDay::Midday,
            17..=19 => TimeOfDay::EveningRush,
            _ => TimeOfDay::Overnight,
        }
    }
}

/// Trajectories are only compared against others that started in the same stratum. Traffic on
/// weekends doesn't vary enough by hour to split further.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stratum {
    Weekend,
    Weekday(TimeOfDay),
}

impl Stratum {
    pub fn of(time: &NaiveDateTime) -> Self {
        match time.weekday() {
            Weekday::Sat | Weekday::Sun => Stratum::Weekend,
            _ => Stratum::Weekday(TimeOfDay::of(time)),
        }
    }
}
