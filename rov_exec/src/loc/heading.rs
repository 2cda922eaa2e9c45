//! Heading sources

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace};

use comms_if::eqpt::gnss::{self, NmeaSentence};
use util::maths::wrap_360_deg;

use crate::serial::{LineReader, SerialLink};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Provides the rover's compass heading (degrees, 0 = north, clockwise).
pub trait HeadingSource: Send {
    /// Poll the sensor, returning true if a new heading was received.
    ///
    /// Must not block.
    fn update(&mut self) -> bool;

    /// Latest heading in [0, 360), `None` until the first reading.
    fn heading_deg(&self) -> Option<f64>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Heading sensor reporting NMEA `HDT` sentences over a serial link.
pub struct NmeaHeading {
    link: Box<dyn SerialLink>,
    reader: LineReader,
    heading_deg: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NmeaHeading {
    pub fn new(link: Box<dyn SerialLink>) -> Self {
        Self {
            link,
            reader: LineReader::new(),
            heading_deg: None,
        }
    }
}

impl HeadingSource for NmeaHeading {
    fn update(&mut self) -> bool {
        let lines = match self.reader.read_lines(self.link.as_mut(), 10) {
            Ok(l) => l,
            Err(e) => {
                debug!("Heading read failed: {}", e);
                return false;
            }
        };

        let mut updated = false;

        for line in lines {
            match gnss::parse_sentence(&line) {
                Ok(NmeaSentence::Hdt { heading_deg }) => {
                    self.heading_deg = Some(wrap_360_deg(heading_deg));
                    updated = true;
                }
                Ok(_) => trace!("Ignoring non-heading sentence on heading link"),
                Err(e) => debug!("Rejected heading sentence {:?}: {}", line, e),
            }
        }

        updated
    }

    fn heading_deg(&self) -> Option<f64> {
        self.heading_deg
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::serial::test::MockLink;
    use comms_if::eqpt::gnss::format_hdt;

    #[test]
    fn test_nmea_heading() {
        let link = MockLink::default();
        let mut h = NmeaHeading::new(Box::new(link.clone()));

        assert!(!h.update());
        assert_eq!(h.heading_deg(), None);

        link.push_rx(format!("{}\r\n{}\r\n", format_hdt("HE", 10.0), format_hdt("HE", 370.5)).as_bytes());
        assert!(h.update());
        assert!((h.heading_deg().unwrap() - 10.5).abs() < 1e-9);

        // Garbage is ignored and the last heading is kept
        link.push_rx(b"$HEHDT,abc,T\r\n");
        assert!(!h.update());
        assert!((h.heading_deg().unwrap() - 10.5).abs() < 1e-9);
    }
}
