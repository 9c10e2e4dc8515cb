//! threshold evaluation and critical-set aggregation
//!
//! both functions are pure: same reading + same thresholds, same answer.

use crate::domain::{Channel, Reading, SensorStatus, ThresholdSet};

/// classify a single value against its channel's thresholds
///
/// temperature and gas: higher is worse, `>=` on both bounds.
/// humidity: lower is worse, strict `<` on both bounds.
pub fn classify(value: f64, channel: Channel, thresholds: &ThresholdSet) -> SensorStatus {
    let t = thresholds.get(channel);

    if channel.lower_is_worse() {
        if value < t.critical {
            SensorStatus::Critical
        } else if value < t.warning {
            SensorStatus::Warning
        } else {
            SensorStatus::Normal
        }
    } else if value >= t.critical {
        SensorStatus::Critical
    } else if value >= t.warning {
        SensorStatus::Warning
    } else {
        SensorStatus::Normal
    }
}

/// status of every channel, in `Channel::ALL` order
pub fn statuses(reading: &Reading, thresholds: &ThresholdSet) -> [(Channel, SensorStatus); 3] {
    Channel::ALL.map(|channel| (channel, classify(reading.value(channel), channel, thresholds)))
}

/// channels currently critical, in `Channel::ALL` order; empty means all safe
pub fn critical_channels(reading: &Reading, thresholds: &ThresholdSet) -> Vec<Channel> {
    statuses(reading, thresholds)
        .into_iter()
        .filter(|(_, status)| *status == SensorStatus::Critical)
        .map(|(channel, _)| channel)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChannelThreshold;

    fn reading(temperature: f64, humidity: f64, gas: f64) -> Reading {
        Reading { temperature, humidity, gas, timestamp: 0 }
    }

    #[test]
    fn temperature_and_gas_are_inclusive_upwards() {
        let t = ThresholdSet::default();
        for channel in [Channel::Temperature, Channel::Gas] {
            let ChannelThreshold { warning, critical } = *t.get(channel);
            assert_eq!(classify(warning - 0.1, channel, &t), SensorStatus::Normal);
            assert_eq!(classify(warning, channel, &t), SensorStatus::Warning);
            assert_eq!(classify(critical - 0.1, channel, &t), SensorStatus::Warning);
            assert_eq!(classify(critical, channel, &t), SensorStatus::Critical);
            assert_eq!(classify(critical * 10.0, channel, &t), SensorStatus::Critical);
        }
    }

    #[test]
    fn humidity_is_strict_downwards() {
        // warning 60, critical 30
        let t = ThresholdSet::default();
        assert_eq!(classify(25.0, Channel::Humidity, &t), SensorStatus::Critical);
        assert_eq!(classify(29.9, Channel::Humidity, &t), SensorStatus::Critical);
        assert_eq!(classify(30.0, Channel::Humidity, &t), SensorStatus::Warning);
        assert_eq!(classify(45.0, Channel::Humidity, &t), SensorStatus::Warning);
        assert_eq!(classify(60.0, Channel::Humidity, &t), SensorStatus::Normal);
        assert_eq!(classify(70.0, Channel::Humidity, &t), SensorStatus::Normal);
    }

    #[test]
    fn hot_reading_is_critical() {
        let mut t = ThresholdSet::default();
        t.temperature = ChannelThreshold { warning: 35.0, critical: 50.0 };
        assert_eq!(classify(52.0, Channel::Temperature, &t), SensorStatus::Critical);
        assert_eq!(critical_channels(&reading(52.0, 50.0, 0.0), &t), vec![Channel::Temperature]);
    }

    #[test]
    fn critical_set_keeps_fixed_order() {
        let t = ThresholdSet::default();
        let all_bad = reading(80.0, 10.0, 5000.0);
        assert_eq!(
            critical_channels(&all_bad, &t),
            vec![Channel::Temperature, Channel::Humidity, Channel::Gas]
        );
        assert_eq!(critical_channels(&reading(20.0, 10.0, 5000.0), &t), vec![Channel::Humidity, Channel::Gas]);
        assert!(critical_channels(&reading(20.0, 65.0, 100.0), &t).is_empty());
    }

    #[test]
    fn threshold_edit_changes_the_answer() {
        let mut t = ThresholdSet::default();
        let r = reading(45.0, 65.0, 100.0);
        assert!(critical_channels(&r, &t).is_empty());

        t.temperature.critical = 44.0;
        assert_eq!(critical_channels(&r, &t), vec![Channel::Temperature]);
    }

    #[test]
    fn zeroed_reading_only_trips_humidity() {
        // what a payload with every field missing turns into
        let t = ThresholdSet::default();
        let s = statuses(&reading(0.0, 0.0, 0.0), &t);
        assert_eq!(s[0], (Channel::Temperature, SensorStatus::Normal));
        assert_eq!(s[1], (Channel::Humidity, SensorStatus::Critical));
        assert_eq!(s[2], (Channel::Gas, SensorStatus::Normal));
    }
}
