//! UTCTime and GeneralizedTime.
//!
//! Both types are encoded as restricted character strings carrying a
//! date and time in a compact digit notation. We check the notation and
//! the calendar ranges of all components but don’t interpret leap seconds
//! or time zones beyond keeping the offset around.

use std::fmt;
use crate::decode::DecodeError;
use crate::mode::Mode;


//------------ Time ----------------------------------------------------------

/// A decoded point in time.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Time {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: Option<u8>,
    pub second: Option<u8>,

    /// The digits of a fractional second, if present.
    pub fraction: Option<String>,

    /// The offset from UTC in minutes.
    ///
    /// This is `Some(0)` for times ending in ‘Z’ and `None` for local time.
    pub offset: Option<i16>,
}

impl Time {
    /// Parses the content of a GeneralizedTime value.
    ///
    /// The accepted format is `YYYYMMDDHH[MM[SS[(.|,)f+]]][Z|±HHMM]`. In
    /// restricted mode, seconds must be present, the time must be in UTC,
    /// and a fraction must use a full stop and not end in a zero.
    pub fn parse_generalized(
        content: &[u8], mode: Mode, pos: usize
    ) -> Result<Self, DecodeError> {
        let mut parser = Parser { content, idx: 0, pos };
        let year = parser.digits(4)?;
        let mut res = parser.date_time(year as u16)?;
        if res.minute.is_some() && parser.digits_follow() {
            res.second = Some(parser.ranged(2, 0, 60, "second")?);
        }
        if res.second.is_some() && matches!(parser.peek(), Some(b'.' | b',')) {
            let sep = parser.take()?;
            let start = parser.idx;
            while parser.digits_follow() {
                parser.idx += 1;
            }
            let digits = &content[start..parser.idx];
            if digits.is_empty() {
                return Err(parser.err("empty fraction"))
            }
            if mode.is_restricted()
                && (sep == b',' || digits.last() == Some(&b'0'))
            {
                return Err(parser.err("non-canonical fraction in DER"))
            }
            res.fraction = Some(
                String::from_utf8_lossy(digits).into_owned()
            );
        }
        res.offset = parser.zone()?;
        parser.finish()?;
        if mode.is_restricted()
            && (res.second.is_none() || res.offset != Some(0))
        {
            return Err(DecodeError::malformed(
                "GeneralizedTime must be in UTC with seconds in DER", pos
            ))
        }
        Ok(res)
    }

    /// Parses the content of a UTCTime value.
    ///
    /// The accepted format is `YYMMDDHHMM[SS](Z|±HHMM)`. Two-digit years
    /// below 50 are taken to be in the 21st century.
    pub fn parse_utc(
        content: &[u8], mode: Mode, pos: usize
    ) -> Result<Self, DecodeError> {
        let mut parser = Parser { content, idx: 0, pos };
        let year = parser.digits(2)? as u16;
        let year = if year < 50 { 2000 + year } else { 1900 + year };
        let mut res = parser.date_time(year)?;
        if res.minute.is_none() {
            return Err(parser.err("missing minutes in UTCTime"))
        }
        if parser.digits_follow() {
            res.second = Some(parser.ranged(2, 0, 60, "second")?);
        }
        res.offset = parser.zone()?;
        parser.finish()?;
        if res.offset.is_none() {
            return Err(DecodeError::malformed(
                "UTCTime without time zone", pos
            ))
        }
        if mode.is_restricted()
            && (res.second.is_none() || res.offset != Some(0))
        {
            return Err(DecodeError::malformed(
                "UTCTime must be in UTC with seconds in DER", pos
            ))
        }
        Ok(res)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour,
            self.minute.unwrap_or(0), self.second.unwrap_or(0)
        )?;
        if let Some(fraction) = self.fraction.as_ref() {
            write!(f, ".{fraction}")?;
        }
        match self.offset {
            Some(0) => f.write_str(" UTC"),
            Some(offset) => {
                let sign = if offset < 0 { '-' } else { '+' };
                let offset = offset.unsigned_abs();
                write!(f, " {}{:02}{:02}", sign, offset / 60, offset % 60)
            }
            None => Ok(())
        }
    }
}


//------------ Parser --------------------------------------------------------

struct Parser<'a> {
    content: &'a [u8],
    idx: usize,
    pos: usize,
}

impl Parser<'_> {
    fn err(&self, detail: &'static str) -> DecodeError {
        DecodeError::malformed(detail, self.pos + self.idx)
    }

    fn peek(&self) -> Option<u8> {
        self.content.get(self.idx).copied()
    }

    fn take(&mut self) -> Result<u8, DecodeError> {
        let res = self.peek().ok_or_else(|| self.err("time too short"))?;
        self.idx += 1;
        Ok(res)
    }

    fn digits_follow(&self) -> bool {
        self.peek().map(|ch| ch.is_ascii_digit()).unwrap_or(false)
    }

    fn digits(&mut self, count: usize) -> Result<u32, DecodeError> {
        let mut res = 0;
        for _ in 0..count {
            let ch = self.take()?;
            if !ch.is_ascii_digit() {
                return Err(self.err("expected digit in time"))
            }
            res = res * 10 + u32::from(ch - b'0');
        }
        Ok(res)
    }

    fn ranged(
        &mut self, count: usize, min: u32, max: u32, what: &'static str
    ) -> Result<u8, DecodeError> {
        let start = self.idx;
        let res = self.digits(count)?;
        if res < min || res > max {
            return Err(DecodeError::malformed(
                format!("{what} out of range"), self.pos + start
            ))
        }
        Ok(res as u8)
    }

    /// Parses month, day, hour and optional minutes.
    fn date_time(&mut self, year: u16) -> Result<Time, DecodeError> {
        let month = self.ranged(2, 1, 12, "month")?;
        let start = self.idx;
        let day = self.ranged(2, 1, 31, "day")?;
        if day > days_in_month(year, month) {
            return Err(DecodeError::malformed(
                "day out of range", self.pos + start
            ))
        }
        let hour = self.ranged(2, 0, 23, "hour")?;
        let minute = if self.digits_follow() {
            Some(self.ranged(2, 0, 59, "minute")?)
        }
        else {
            None
        };
        Ok(Time {
            year, month, day, hour, minute,
            second: None, fraction: None, offset: None
        })
    }

    fn zone(&mut self) -> Result<Option<i16>, DecodeError> {
        match self.peek() {
            Some(b'Z') => {
                self.idx += 1;
                Ok(Some(0))
            }
            Some(sign @ (b'+' | b'-')) => {
                self.idx += 1;
                let hours = i16::from(self.ranged(2, 0, 23, "zone hour")?);
                let minutes = i16::from(
                    self.ranged(2, 0, 59, "zone minute")?
                );
                let offset = hours * 60 + minutes;
                Ok(Some(if sign == b'-' { -offset } else { offset }))
            }
            _ => Ok(None)
        }
    }

    fn finish(&self) -> Result<(), DecodeError> {
        if self.idx == self.content.len() {
            Ok(())
        }
        else {
            Err(self.err("trailing characters in time"))
        }
    }
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            }
            else {
                28
            }
        }
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    fn gen(s: &str, mode: Mode) -> Result<Time, DecodeError> {
        Time::parse_generalized(s.as_bytes(), mode, 0)
    }

    #[test]
    fn generalized_time() {
        let time = gen("20240229123456Z", Mode::Der).unwrap();
        assert_eq!(time.year, 2024);
        assert_eq!(time.month, 2);
        assert_eq!(time.day, 29);
        assert_eq!(time.second, Some(56));
        assert_eq!(time.to_string(), "2024-02-29 12:34:56 UTC");

        let time = gen("2023010112", Mode::Ber).unwrap();
        assert_eq!(time.minute, None);
        assert_eq!(time.offset, None);

        let time = gen("20230101120000,5+0130", Mode::Ber).unwrap();
        assert_eq!(time.fraction.as_deref(), Some("5"));
        assert_eq!(time.offset, Some(90));
        assert_eq!(time.to_string(), "2023-01-01 12:00:00.5 +0130");
    }

    #[test]
    fn generalized_time_errors() {
        assert!(gen("20230229120000Z", Mode::Ber).is_err());
        assert!(gen("20231301120000Z", Mode::Ber).is_err());
        assert!(gen("20230101240000Z", Mode::Ber).is_err());
        assert!(gen("2023010112000Z", Mode::Ber).is_err());
        assert!(gen("20230101120000.Z", Mode::Ber).is_err());
        assert!(gen("20230101120000Zx", Mode::Ber).is_err());
        assert!(gen("2023", Mode::Ber).is_err());
        assert!(gen("20230101120000", Mode::Der).is_err());
        assert!(gen("20230101120000.50Z", Mode::Der).is_err());
        assert!(gen("20230101120000.5Z", Mode::Der).is_ok());
        let err = gen("20231341120000Z", Mode::Ber).unwrap_err();
        assert_eq!(err.pos(), 4);
    }

    #[test]
    fn utc_time() {
        let time = Time::parse_utc(b"491231235959Z", Mode::Der, 0).unwrap();
        assert_eq!(time.year, 2049);
        let time = Time::parse_utc(b"5001010000-0500", Mode::Ber, 0).unwrap();
        assert_eq!(time.year, 1950);
        assert_eq!(time.second, None);
        assert_eq!(time.offset, Some(-300));
        assert!(Time::parse_utc(b"5001010000", Mode::Ber, 0).is_err());
        assert!(Time::parse_utc(b"50010100Z", Mode::Ber, 0).is_err());
        assert!(Time::parse_utc(b"5001010000Z", Mode::Der, 0).is_err());
    }
}
