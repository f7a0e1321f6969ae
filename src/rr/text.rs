// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Parsing of RDATA from its presentation format.
//!
//! Only the types that configured zones commonly carry are understood
//! by name. Anything else may be given in the generic [RFC 3597 § 5]
//! form, `\# <length> <hex>`. All domain names must be fully qualified.
//!
//! [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5

use std::net::{Ipv4Addr, Ipv6Addr};

use super::Type;
use crate::name::Name;
use crate::util::ascii_hex_digit_to_nibble;

/// Parses presentation-format RDATA of type `rr_type` into its
/// uncompressed wire form.
pub fn parse_rdata(rr_type: Type, text: &str) -> Result<Box<[u8]>, &'static str> {
    let fields = split_fields(text)?;
    if fields.first().map(String::as_str) == Some("\\#") {
        return parse_generic(&fields[1..]);
    }

    let mut rdata = Vec::new();
    match rr_type {
        Type::A => {
            let [address] = exactly::<1>(&fields)?;
            let address: Ipv4Addr = address.parse().or(Err("invalid IPv4 address"))?;
            rdata.extend_from_slice(&address.octets());
        }
        Type::AAAA => {
            let [address] = exactly::<1>(&fields)?;
            let address: Ipv6Addr = address.parse().or(Err("invalid IPv6 address"))?;
            rdata.extend_from_slice(&address.octets());
        }
        Type::NS | Type::CNAME | Type::PTR => {
            let [target] = exactly::<1>(&fields)?;
            rdata.extend_from_slice(parse_name(target)?.wire_repr());
        }
        Type::MX => {
            let [preference, exchange] = exactly::<2>(&fields)?;
            let preference: u16 = preference.parse().or(Err("invalid MX preference"))?;
            rdata.extend_from_slice(&preference.to_be_bytes());
            rdata.extend_from_slice(parse_name(exchange)?.wire_repr());
        }
        Type::TXT => {
            if fields.is_empty() {
                return Err("TXT records need at least one character-string");
            }
            for string in &fields {
                if string.len() > 255 {
                    return Err("character-string is longer than 255 octets");
                }
                rdata.push(string.len() as u8);
                rdata.extend_from_slice(string.as_bytes());
            }
        }
        Type::SOA => {
            let [mname, rname, serial, refresh, retry, expire, minimum] = exactly::<7>(&fields)?;
            rdata.extend_from_slice(parse_name(mname)?.wire_repr());
            rdata.extend_from_slice(parse_name(rname)?.wire_repr());
            for field in [serial, refresh, retry, expire, minimum] {
                let value: u32 = field.parse().or(Err("invalid SOA integer field"))?;
                rdata.extend_from_slice(&value.to_be_bytes());
            }
        }
        Type::DS => {
            let [key_tag, algorithm, digest_type, digest] = exactly::<4>(&fields)?;
            let key_tag: u16 = key_tag.parse().or(Err("invalid DS key tag"))?;
            let algorithm: u8 = algorithm.parse().or(Err("invalid DS algorithm"))?;
            let digest_type: u8 = digest_type.parse().or(Err("invalid DS digest type"))?;
            rdata.extend_from_slice(&key_tag.to_be_bytes());
            rdata.push(algorithm);
            rdata.push(digest_type);
            rdata.extend_from_slice(&parse_hex(digest)?);
        }
        _ => return Err("type must be given in the generic \\# form"),
    }
    Ok(rdata.into_boxed_slice())
}

/// Parses the generic `\# <length> <hex>...` form (the `\#` has been
/// stripped already).
fn parse_generic(fields: &[String]) -> Result<Box<[u8]>, &'static str> {
    let (length, hex) = fields.split_first().ok_or("missing RDATA length")?;
    let length: usize = length.parse().or(Err("invalid RDATA length"))?;
    let rdata = parse_hex(&hex.concat())?;
    if rdata.len() != length {
        Err("RDATA length does not match the data given")
    } else {
        Ok(rdata.into_boxed_slice())
    }
}

fn parse_name(text: &str) -> Result<Name, &'static str> {
    text.parse().or(Err("invalid domain name"))
}

fn parse_hex(text: &str) -> Result<Vec<u8>, &'static str> {
    let digits = text.as_bytes();
    if digits.len() % 2 != 0 {
        return Err("odd number of hex digits");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let high = ascii_hex_digit_to_nibble(pair[0]);
            let low = ascii_hex_digit_to_nibble(pair[1]);
            high.zip(low)
                .map(|(high, low)| (high << 4) | low)
                .ok_or("invalid hex digit")
        })
        .collect()
}

fn exactly<const N: usize>(fields: &[String]) -> Result<[&str; N], &'static str> {
    if fields.len() != N {
        return Err("wrong number of RDATA fields");
    }
    let mut out = [""; N];
    for (slot, field) in out.iter_mut().zip(fields) {
        *slot = field.as_str();
    }
    Ok(out)
}

/// Splits RDATA text into whitespace-separated fields. Double quotes
/// group a field (so it may contain spaces) and a backslash makes the
/// next character literal, except that `\#` at the very start is kept
/// intact for the generic form.
fn split_fields(text: &str) -> Result<Vec<String>, &'static str> {
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix("\\#") {
        let mut fields = vec!["\\#".to_owned()];
        fields.extend(rest.split_whitespace().map(str::to_owned));
        return Ok(fields);
    }

    let mut fields = Vec::new();
    let mut current: Option<String> = None;
    let mut in_quotes = false;
    let mut chars = trimmed.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or("dangling escape")?;
                current.get_or_insert_with(String::new).push(escaped);
            }
            '"' => {
                if in_quotes {
                    fields.push(current.take().unwrap_or_default());
                }
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if let Some(field) = current.take() {
                    fields.push(field);
                }
            }
            c => current.get_or_insert_with(String::new).push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted string");
    }
    fields.extend(current);
    Ok(fields)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_address_records() {
        assert_eq!(&*parse_rdata(Type::A, "1.2.3.4").unwrap(), &[1, 2, 3, 4]);
        assert_eq!(parse_rdata(Type::AAAA, "::1").unwrap().len(), 16);
        assert!(parse_rdata(Type::A, "1.2.3").is_err());
    }

    #[test]
    fn parses_name_records() {
        assert_eq!(
            &*parse_rdata(Type::NS, "ns1.example.com.").unwrap(),
            b"\x03ns1\x07example\x03com\x00"
        );
        assert_eq!(
            &*parse_rdata(Type::MX, "10 mail.example.com.").unwrap(),
            b"\x00\x0a\x04mail\x07example\x03com\x00"
        );
        assert!(parse_rdata(Type::CNAME, "relative").is_err());
    }

    #[test]
    fn parses_txt_with_quotes() {
        assert_eq!(
            &*parse_rdata(Type::TXT, "\"hello world\" bare").unwrap(),
            b"\x0bhello world\x04bare"
        );
        assert!(parse_rdata(Type::TXT, "\"unterminated").is_err());
    }

    #[test]
    fn parses_ds() {
        let rdata = parse_rdata(Type::DS, "60485 5 1 2BB183AF5F22588179A53B0A98631FAD1A292118")
            .unwrap();
        assert_eq!(&rdata[0..4], &[0xec, 0x45, 5, 1]);
        assert_eq!(rdata.len(), 24);
    }

    #[test]
    fn parses_generic_form() {
        assert_eq!(
            &*parse_rdata(Type::from(65280), "\\# 3 abcd ef").unwrap(),
            &[0xab, 0xcd, 0xef]
        );
        assert!(parse_rdata(Type::from(65280), "\\# 4 abcdef").is_err());
        assert!(parse_rdata(Type::from(65280), "abcdef").is_err());
    }
}
