use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use nom::IResult;
use nom::bytes::complete::take;
use nom::number::complete::be_u16;

use crate::ParseBe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RouteDistinguisherType {
    ASN = 0,
    IP = 1,
}

impl From<u16> for RouteDistinguisherType {
    fn from(val: u16) -> Self {
        match val {
            1 => RouteDistinguisherType::IP,
            _ => RouteDistinguisherType::ASN,
        }
    }
}

/// 8-byte BGP/MPLS-VPN route distinguisher: a 2-byte type field followed by
/// a 6-byte type-specific value (ASN:value or IPv4-address:value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteDistinguisher {
    pub typ: RouteDistinguisherType,
    pub val: [u8; 6],
}

impl Default for RouteDistinguisher {
    fn default() -> Self {
        Self {
            typ: RouteDistinguisherType::ASN,
            val: [0u8; 6],
        }
    }
}

impl ParseBe<RouteDistinguisher> for RouteDistinguisher {
    fn parse_be(input: &[u8]) -> IResult<&[u8], RouteDistinguisher> {
        let (input, typ) = be_u16(input)?;
        let (input, val) = take(6usize)(input)?;
        let mut buf = [0u8; 6];
        buf.copy_from_slice(val);
        Ok((
            input,
            RouteDistinguisher {
                typ: RouteDistinguisherType::from(typ),
                val: buf,
            },
        ))
    }
}

impl RouteDistinguisher {
    /// Two-octet-AS RD: 2-byte ASN followed by a 4-byte local administrator.
    pub fn new_asn(asn: u32, local: u16) -> Self {
        let mut val = [0u8; 6];
        let asn2 = asn.min(u16::MAX as u32) as u16;
        val[0..2].copy_from_slice(&asn2.to_be_bytes());
        val[2..6].copy_from_slice(&(local as u32).to_be_bytes());
        Self {
            typ: RouteDistinguisherType::ASN,
            val,
        }
    }

    pub fn new_ip(ip: Ipv4Addr, local: u16) -> Self {
        let mut val = [0u8; 6];
        val[0..4].copy_from_slice(&ip.octets());
        val[4..6].copy_from_slice(&local.to_be_bytes());
        Self {
            typ: RouteDistinguisherType::IP,
            val,
        }
    }
}

impl fmt::Display for RouteDistinguisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            RouteDistinguisherType::ASN => {
                let asn = u16::from_be_bytes([self.val[0], self.val[1]]);
                let local = u32::from_be_bytes([self.val[2], self.val[3], self.val[4], self.val[5]]);
                write!(f, "{asn}:{local}")
            }
            RouteDistinguisherType::IP => {
                let ip = Ipv4Addr::new(self.val[0], self.val[1], self.val[2], self.val[3]);
                let local = u16::from_be_bytes([self.val[4], self.val[5]]);
                write!(f, "{ip}:{local}")
            }
        }
    }
}

impl FromStr for RouteDistinguisher {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (left, right) = s.split_once(':').ok_or(())?;
        let local: u16 = right.parse().map_err(|_| ())?;
        if let Ok(ip) = left.parse::<Ipv4Addr>() {
            Ok(Self::new_ip(ip, local))
        } else {
            let asn: u32 = left.parse().map_err(|_| ())?;
            Ok(Self::new_asn(asn, local))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asn_round_trip() {
        let rd = RouteDistinguisher::from_str("64496:1").unwrap();
        assert_eq!(rd.to_string(), "64496:1");
    }

    #[test]
    fn ip_round_trip() {
        let rd = RouteDistinguisher::from_str("1.2.3.4:200").unwrap();
        assert_eq!(rd.to_string(), "1.2.3.4:200");
    }
}
