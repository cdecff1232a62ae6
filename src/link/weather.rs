//! Weather forecast push (one 145-byte struct, no header).

use super::reassembler::FixedRecord;
use super::wire::{be_i16, be_u16, fixed_str};

pub const WEATHER_LEN: usize = 145;
pub const MAX_HOURLY: usize = 6;

const HOURLY_AT: usize = 115;
const HOURLY_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyForecast {
    pub hour: u8,
    pub temp: i16,
    pub condition: u8,
    pub precip_chance: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherReport {
    /// Set when the phone could not fetch a forecast; only `error` is meaningful then.
    pub error: Option<heapless::String<64>>,
    pub location: heapless::String<32>,
    pub current_temp: i16,
    pub feels_like: i16,
    pub condition: u8,
    pub humidity: u8,
    pub wind_speed: u16,
    pub wind_dir: u16,
    pub pressure: u16,
    pub precip_chance: u8,
    /// Minutes after local midnight.
    pub sunrise: u16,
    pub sunset: u16,
    pub hourly: heapless::Vec<HourlyForecast, MAX_HOURLY>,
}

impl FixedRecord for WeatherReport {
    const NAME: &'static str = "weather";
    const LEN: usize = WEATHER_LEN;

    fn precheck(first: u8) -> bool {
        first <= 1
    }

    fn parse(raw: &[u8]) -> Self {
        let error = (raw[0] != 0).then(|| fixed_str::<64>(&raw[1..65]));

        let count = (raw[114] as usize).min(MAX_HOURLY);
        let hourly = raw[HOURLY_AT..HOURLY_AT + count * HOURLY_LEN]
            .chunks_exact(HOURLY_LEN)
            .map(|h| HourlyForecast {
                hour: h[0],
                temp: be_i16(h, 1),
                condition: h[3],
                precip_chance: h[4],
            })
            .collect();

        Self {
            error,
            location: fixed_str(&raw[65..97]),
            current_temp: be_i16(raw, 97),
            feels_like: be_i16(raw, 99),
            condition: raw[101],
            humidity: raw[102],
            wind_speed: be_u16(raw, 103),
            wind_dir: be_u16(raw, 105),
            pressure: be_u16(raw, 107),
            precip_chance: raw[109],
            sunrise: be_u16(raw, 110),
            sunset: be_u16(raw, 112),
            hourly,
        }
    }
}
