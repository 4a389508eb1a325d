//! Record-line scanners.
//!
//! Two parsers produce identical results on every valid record: a fused
//! single-pass scanner that walks the line once, counting commas and
//! accumulating digits in the same loop, and a straightforward
//! split-and-parse reference. The reader tries the fused path first and
//! falls back to the reference on any anomaly, so an accelerated
//! scanner can never change what a record parses to.

use super::Record;

/// Fused single-pass scanner. Returns `None` on any anomaly: wrong
/// comma count, empty field, stray character, sign on an unsigned
/// field, or a value that does not fit its destination.
pub fn parse_record(line: &str) -> Option<Record> {
    let mut values = [0i64; 7];
    let mut field = 0usize;
    let mut digits = 0usize;
    let mut negative = false;
    let mut acc: i64 = 0;

    for &byte in line.as_bytes() {
        match byte {
            b',' => {
                if field >= 6 || digits == 0 {
                    return None;
                }
                values[field] = if negative { -acc } else { acc };
                field += 1;
                digits = 0;
                negative = false;
                acc = 0;
            }
            b'-' if digits == 0 && !negative => {
                // Only the residence/age/gender/population fields are signed.
                if field < 3 {
                    return None;
                }
                negative = true;
            }
            b'0'..=b'9' => {
                digits += 1;
                if digits > 18 {
                    return None;
                }
                acc = acc * 10 + i64::from(byte - b'0');
            }
            _ => return None,
        }
    }

    if field != 6 || digits == 0 {
        return None;
    }
    values[6] = if negative { -acc } else { acc };

    Some(Record {
        date: u32::try_from(values[0]).ok()?,
        time: u16::try_from(values[1]).ok()?,
        area: u64::try_from(values[2]).ok()?,
        residence: i32::try_from(values[3]).ok()?,
        age: i32::try_from(values[4]).ok()?,
        gender: i32::try_from(values[5]).ok()?,
        population: i32::try_from(values[6]).ok()?,
    })
}

/// Reference scanner: split on commas, parse each field into its sized
/// destination.
pub fn parse_record_scalar(line: &str) -> Option<Record> {
    let mut fields = line.split(',');

    let record = Record {
        date: fields.next()?.parse().ok()?,
        time: fields.next()?.parse().ok()?,
        area: fields.next()?.parse().ok()?,
        residence: fields.next()?.parse().ok()?,
        age: fields.next()?.parse().ok()?,
        gender: fields.next()?.parse().ok()?,
        population: fields.next()?.parse().ok()?,
    };

    // Exactly seven fields.
    if fields.next().is_some() {
        return None;
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_LINES: &[&str] = &[
        "20160101,0100,362257341,-1,-1,-1,100",
        "20160101,0000,684827214,-1,-1,-1,0",
        "20161231,2300,533946395,1,25,2,2147483647",
        "20160229,1200,100000000,-1,-1,-1,-5",
        "20170704,0030,999999999,0,0,0,42",
    ];

    const INVALID_LINES: &[&str] = &[
        "",
        "20160101,0100,362257341,-1,-1,-1",          // six fields
        "20160101,0100,362257341,-1,-1,-1,100,7",    // eight fields
        "20160101,0100,362257341,-1,-1,-1,",         // empty field
        "20160101,0100,,-1,-1,-1,100",               // empty field
        "20160101,0100,362257341,-1,-1,-1,1x0",      // stray character
        "20160101,0100,362257341,-1,-1,-1, 100",     // embedded space
        "-20160101,0100,362257341,-1,-1,-1,100",     // sign on date
        "20160101,0100,362257341,--1,-1,-1,100",     // double sign
        "99999999999,0100,362257341,-1,-1,-1,100",   // date overflows u32
        "20160101,70000,362257341,-1,-1,-1,100",     // time overflows u16
        "20160101,0100,362257341,-1,-1,-1,2147483648", // population overflows i32
    ];

    #[test]
    fn test_valid_record() {
        let record = parse_record("20160101,0100,362257341,-1,-1,-1,100").unwrap();
        assert_eq!(record.date, 20160101);
        assert_eq!(record.time, 100);
        assert_eq!(record.area, 362257341);
        assert_eq!(record.residence, -1);
        assert_eq!(record.age, -1);
        assert_eq!(record.gender, -1);
        assert_eq!(record.population, 100);
    }

    #[test]
    fn test_invalid_records_rejected() {
        for line in INVALID_LINES {
            assert_eq!(parse_record(line), None, "fused accepted {line:?}");
            assert_eq!(parse_record_scalar(line), None, "scalar accepted {line:?}");
        }
    }

    #[test]
    fn test_fused_matches_scalar_on_valid_records() {
        for line in VALID_LINES {
            let fused = parse_record(line);
            let scalar = parse_record_scalar(line);
            assert!(fused.is_some(), "fused rejected {line:?}");
            assert_eq!(fused, scalar, "disagreement on {line:?}");
        }
    }

    #[test]
    fn test_fused_never_disagrees_with_scalar() {
        // Sweep a generated family of lines; wherever both parsers
        // accept, they must agree.
        for population in [-100, -1, 0, 1, 999_999] {
            for area in [100000000u64, 362257341, 999999999] {
                let line = format!("20160315,1400,{area},-1,-1,-1,{population}");
                assert_eq!(parse_record(&line), parse_record_scalar(&line));
            }
        }
    }
}
