//! Records exchanged between the probe, the sample store and the analyzer

use core::{fmt, str::FromStr};

/// Logical processor number as exposed by the OS
pub type CoreId = u32;

/// Directed core pair identifying one probe direction
///
/// The text form `"<from>-<to>"` is the key of the raw sample store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    /// Requesting core
    pub from: CoreId,
    /// Responding core
    pub to: CoreId,
}

impl PairKey {
    pub const fn new(from: CoreId, to: CoreId) -> Self {
        Self { from, to }
    }

    /// Same pair with the lower core id first
    pub fn normalized(self) -> Self {
        if self.from <= self.to {
            self
        } else {
            self.reversed()
        }
    }

    /// Opposite direction
    pub const fn reversed(self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

impl FromStr for PairKey {
    type Err = ParseSampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s.split_once('-').ok_or(ParseSampleError::BadPairKey)?;
        let from = from.trim().parse().map_err(|_| ParseSampleError::BadPairKey)?;
        let to = to.trim().parse().map_err(|_| ParseSampleError::BadPairKey)?;
        Ok(Self { from, to })
    }
}

/// One ping-pong exchange between two cores
///
/// `departure1` and `arrival2` are read on the requester, `arrival1` and
/// `departure2` on the responder. Text form: six whitespace-separated
/// integers in field order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawSample {
    pub requester: CoreId,
    pub responder: CoreId,
    /// Requester counter when the ping left
    pub departure1: i64,
    /// Responder counter when the ping arrived
    pub arrival1: i64,
    /// Responder counter when the pong left
    pub departure2: i64,
    /// Requester counter when the pong arrived
    pub arrival2: i64,
}

impl fmt::Display for RawSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.requester,
            self.responder,
            self.departure1,
            self.arrival1,
            self.departure2,
            self.arrival2
        )
    }
}

impl FromStr for RawSample {
    type Err = ParseSampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        let mut next = || -> Result<i64, ParseSampleError> {
            fields
                .next()
                .ok_or(ParseSampleError::MissingField)?
                .parse()
                .map_err(|_| ParseSampleError::BadNumber)
        };

        let requester = next()?;
        let responder = next()?;
        let sample = RawSample {
            requester: CoreId::try_from(requester).map_err(|_| ParseSampleError::BadNumber)?,
            responder: CoreId::try_from(responder).map_err(|_| ParseSampleError::BadNumber)?,
            departure1: next()?,
            arrival1: next()?,
            departure2: next()?,
            arrival2: next()?,
        };

        if fields.next().is_some() {
            return Err(ParseSampleError::TrailingField);
        }
        Ok(sample)
    }
}

/// Why a sample record or pair key could not be parsed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseSampleError {
    /// Fewer than six fields
    MissingField,
    /// More than six fields
    TrailingField,
    /// A field is not a decimal integer in range
    BadNumber,
    /// Not of the form `<from>-<to>`
    BadPairKey,
}

impl fmt::Display for ParseSampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseSampleError::MissingField => "expected six integer fields",
            ParseSampleError::TrailingField => "more than six fields",
            ParseSampleError::BadNumber => "field is not a valid integer",
            ParseSampleError::BadPairKey => "pair key must look like <from>-<to>",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_text_form() {
        let key: PairKey = "12-3".parse().unwrap();
        assert_eq!(key, PairKey::new(12, 3));
        assert_eq!(key.normalized(), PairKey::new(3, 12));
        assert_eq!(key.reversed(), PairKey::new(3, 12));
        assert!("12".parse::<PairKey>().is_err());
    }

    #[test]
    fn test_raw_sample_parse() {
        let sample: RawSample = "0 1 100 1150 1200 2180".parse().unwrap();
        assert_eq!(sample.requester, 0);
        assert_eq!(sample.responder, 1);
        assert_eq!(sample.arrival2, 2180);

        assert_eq!(
            "0 1 100 1150".parse::<RawSample>(),
            Err(ParseSampleError::MissingField)
        );
        assert_eq!(
            "0 1 100 1150 1200 2180 7".parse::<RawSample>(),
            Err(ParseSampleError::TrailingField)
        );
        assert_eq!(
            "0 1 100 x 1200 2180".parse::<RawSample>(),
            Err(ParseSampleError::BadNumber)
        );
        assert_eq!(
            "-1 1 100 1150 1200 2180".parse::<RawSample>(),
            Err(ParseSampleError::BadNumber)
        );
    }
}
