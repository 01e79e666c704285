use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::{Error, Result};
use crate::phy::ChecksumCapabilities;
use crate::wire::ip::checksum;
use crate::wire::Ipv4Repr;

enum_with_unknown! {
    /// Internet protocol control message type.
    pub enum Message(u8) {
        EchoReply      = 0,
        DstUnreachable = 3,
        EchoRequest    = 8,
        TimeExceeded   = 11,
        ParamProblem   = 12
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::EchoReply => write!(f, "echo reply"),
            Message::DstUnreachable => write!(f, "destination unreachable"),
            Message::EchoRequest => write!(f, "echo request"),
            Message::TimeExceeded => write!(f, "time exceeded"),
            Message::ParamProblem => write!(f, "parameter problem"),
            Message::Unknown(id) => write!(f, "{id}"),
        }
    }
}

enum_with_unknown! {
    /// Internet protocol control message subtype for type "Destination Unreachable".
    pub enum DstUnreachable(u8) {
        NetUnreachable   =  0,
        HostUnreachable  =  1,
        ProtoUnreachable =  2,
        PortUnreachable  =  3,
        FragRequired     =  4,
        SrcRouteFailed   =  5,
        DstNetUnknown    =  6,
        DstHostUnknown   =  7,
        SrcHostIsolated  =  8,
        NetProhibited    =  9,
        HostProhibited   = 10,
        NetUnreachToS    = 11,
        HostUnreachToS   = 12,
        CommProhibited   = 13,
        HostPrecedViol   = 14,
        PrecedCutoff     = 15
    }
}

enum_with_unknown! {
    /// Internet protocol control message subtype for type "Time Exceeded".
    pub enum TimeExceeded(u8) {
        TtlExpired  = 0,
        FragExpired = 1
    }
}

enum_with_unknown! {
    /// Internet protocol control message subtype for type "Parameter Problem".
    pub enum ParamProblem(u8) {
        AtPointer       = 0,
        MissingOption   = 1,
        BadLength       = 2
    }
}

enum_with_unknown! {
    /// Internet protocol control message subtype for type "Redirect".
    pub enum Redirect(u8) {
        Network      = 0,
        Host         = 1,
        ToSNetwork   = 2,
        ToSHost      = 3
    }
}

mod field {
    use crate::wire::field::*;

    pub const TYPE: usize = 0;
    pub const CODE: usize = 1;
    pub const CHECKSUM: Field = 2..4;

    pub const ECHO_IDENT: Field = 4..6;
    pub const ECHO_SEQNO: Field = 6..8;
    pub const ECHO_PAYLOAD: Rest = 8..;

    pub const UNUSED: Field = 4..8;
    pub const HEADER: Rest = 8..;
}

pub const HEADER_LEN: usize = field::UNUSED.end;

/// A read/write wrapper around an ICMPv4 packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with ICMPv4 packet structure.
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < HEADER_LEN {
            Err(Error)
        } else {
            Ok(())
        }
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the message type field.
    #[inline]
    pub fn msg_type(&self) -> Message {
        Message::from(self.buffer.as_ref()[field::TYPE])
    }

    /// Return the message code field.
    #[inline]
    pub fn msg_code(&self) -> u8 {
        self.buffer.as_ref()[field::CODE]
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CHECKSUM])
    }

    /// Return the identifier field (for echo request/reply).
    #[inline]
    pub fn echo_ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::ECHO_IDENT])
    }

    /// Return the sequence number field (for echo request/reply).
    #[inline]
    pub fn echo_seq_no(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::ECHO_SEQNO])
    }

    /// Validate the packet checksum.
    pub fn verify_checksum(&self) -> bool {
        checksum::data(self.buffer.as_ref()) == !0
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return a pointer to the payload, for echo request/reply messages.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        &self.buffer.as_ref()[field::ECHO_PAYLOAD]
    }

    /// Return a pointer to the header that follows the ICMPv4 header, for
    /// error messages (which embed the IP header and leading octets of the
    /// packet that triggered the error).
    #[inline]
    pub fn header(&self) -> &'a [u8] {
        &self.buffer.as_ref()[field::HEADER]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the message type field.
    #[inline]
    pub fn set_msg_type(&mut self, value: Message) {
        self.buffer.as_mut()[field::TYPE] = value.into();
    }

    /// Set the message code field.
    #[inline]
    pub fn set_msg_code(&mut self, value: u8) {
        self.buffer.as_mut()[field::CODE] = value;
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value)
    }

    /// Set the identifier field (for echo request/reply).
    #[inline]
    pub fn set_echo_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::ECHO_IDENT], value)
    }

    /// Set the sequence number field (for echo request/reply).
    #[inline]
    pub fn set_echo_seq_no(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::ECHO_SEQNO], value)
    }

    /// Return a mutable pointer to the echo payload.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[field::ECHO_PAYLOAD]
    }

    /// Compute and fill in the header checksum.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = !checksum::data(self.buffer.as_ref());
        self.set_checksum(checksum)
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A high-level representation of an Internet Control Message Protocol version 4 packet header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum Repr<'a> {
    EchoRequest {
        ident: u16,
        seq_no: u16,
        data: &'a [u8],
    },
    EchoReply {
        ident: u16,
        seq_no: u16,
        data: &'a [u8],
    },
    DstUnreachable {
        reason: DstUnreachable,
        header: Ipv4Repr,
        data: &'a [u8],
    },
    TimeExceeded {
        reason: TimeExceeded,
        header: Ipv4Repr,
        data: &'a [u8],
    },
}

/// Parse the IPv4 header embedded in an ICMPv4 error message.
///
/// RFC 792 only guarantees the header plus the first 8 octets of the
/// original datagram are present, so this reads fields directly instead of
/// going through [`Ipv4Repr::parse`], which would reject the packet as
/// truncated.
fn parse_embedded_ipv4(data: &[u8]) -> Result<(Ipv4Repr, &[u8])> {
    if data.len() < crate::wire::IPV4_HEADER_LEN {
        return Err(Error);
    }
    let ihl = ((data[0] & 0x0f) as usize) * 4;
    if ihl < crate::wire::IPV4_HEADER_LEN || data.len() < ihl {
        return Err(Error);
    }
    let ip_packet = crate::wire::Ipv4Packet::new_unchecked(&data[..ihl]);
    let repr = Ipv4Repr {
        src_addr: ip_packet.src_addr(),
        dst_addr: ip_packet.dst_addr(),
        next_header: ip_packet.protocol(),
        payload_len: data.len() - ihl,
        hop_limit: ip_packet.hop_limit(),
    };
    Ok((repr, &data[ihl..]))
}

impl<'a> Repr<'a> {
    /// Parse an ICMPv4 packet and return a high-level representation.
    pub fn parse<T: AsRef<[u8]> + ?Sized>(
        packet: &Packet<&'a T>,
        checksum_caps: &ChecksumCapabilities,
    ) -> Result<Repr<'a>> {
        packet.check_len()?;
        if checksum_caps.icmpv4.rx() && !packet.verify_checksum() {
            return Err(Error);
        }

        match (packet.msg_type(), packet.msg_code()) {
            (Message::EchoRequest, 0) => Ok(Repr::EchoRequest {
                ident: packet.echo_ident(),
                seq_no: packet.echo_seq_no(),
                data: packet.data(),
            }),
            (Message::EchoReply, 0) => Ok(Repr::EchoReply {
                ident: packet.echo_ident(),
                seq_no: packet.echo_seq_no(),
                data: packet.data(),
            }),
            (Message::DstUnreachable, code) => {
                let (ip_repr, rest) = parse_embedded_ipv4(packet.header())?;
                Ok(Repr::DstUnreachable {
                    reason: DstUnreachable::from(code),
                    header: ip_repr,
                    data: rest,
                })
            }
            (Message::TimeExceeded, code) => {
                let (ip_repr, rest) = parse_embedded_ipv4(packet.header())?;
                Ok(Repr::TimeExceeded {
                    reason: TimeExceeded::from(code),
                    header: ip_repr,
                    data: rest,
                })
            }
            _ => Err(Error),
        }
    }

    /// Return the length of a packet that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        match self {
            Repr::EchoRequest { data, .. } | Repr::EchoReply { data, .. } => {
                field::ECHO_PAYLOAD.start + data.len()
            }
            Repr::DstUnreachable { header, data, .. }
            | Repr::TimeExceeded { header, data, .. } => {
                field::HEADER.start + header.buffer_len() + data.len()
            }
        }
    }

    /// Emit a high-level representation into an ICMPv4 packet.
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(
        &self,
        packet: &mut Packet<&mut T>,
        checksum_caps: &ChecksumCapabilities,
    ) {
        match *self {
            Repr::EchoRequest {
                ident,
                seq_no,
                data,
            } => {
                packet.set_msg_type(Message::EchoRequest);
                packet.set_msg_code(0);
                packet.set_echo_ident(ident);
                packet.set_echo_seq_no(seq_no);
                packet.data_mut()[..data.len()].copy_from_slice(data);
            }
            Repr::EchoReply {
                ident,
                seq_no,
                data,
            } => {
                packet.set_msg_type(Message::EchoReply);
                packet.set_msg_code(0);
                packet.set_echo_ident(ident);
                packet.set_echo_seq_no(seq_no);
                packet.data_mut()[..data.len()].copy_from_slice(data);
            }
            Repr::DstUnreachable {
                reason,
                header,
                data,
            } => {
                packet.set_msg_type(Message::DstUnreachable);
                packet.set_msg_code(reason.into());
                let buf = &mut packet.buffer.as_mut()[field::HEADER];
                let mut ip_packet = crate::wire::Ipv4Packet::new_unchecked(
                    &mut buf[..header.buffer_len()],
                );
                header.emit(&mut ip_packet, &ChecksumCapabilities::ignored());
                buf[header.buffer_len()..header.buffer_len() + data.len()].copy_from_slice(data);
            }
            Repr::TimeExceeded {
                reason,
                header,
                data,
            } => {
                packet.set_msg_type(Message::TimeExceeded);
                packet.set_msg_code(reason.into());
                let buf = &mut packet.buffer.as_mut()[field::HEADER];
                let mut ip_packet = crate::wire::Ipv4Packet::new_unchecked(
                    &mut buf[..header.buffer_len()],
                );
                header.emit(&mut ip_packet, &ChecksumCapabilities::ignored());
                buf[header.buffer_len()..header.buffer_len() + data.len()].copy_from_slice(data);
            }
        }

        if checksum_caps.icmpv4.tx() {
            packet.fill_checksum();
        } else {
            packet.set_checksum(0);
        }
    }
}

impl<'a> fmt::Display for Repr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Repr::EchoRequest { ident, seq_no, .. } => {
                write!(f, "ICMPv4 echo request id={ident} seq={seq_no}")
            }
            Repr::EchoReply { ident, seq_no, .. } => {
                write!(f, "ICMPv4 echo reply id={ident} seq={seq_no}")
            }
            Repr::DstUnreachable { reason, .. } => {
                write!(f, "ICMPv4 destination unreachable ({reason:?})")
            }
            Repr::TimeExceeded { reason, .. } => write!(f, "ICMPv4 time exceeded ({reason:?})"),
        }
    }
}

use crate::wire::pretty_print::{PrettyIndent, PrettyPrint};

impl<T: AsRef<[u8]>> PrettyPrint for Packet<T> {
    fn pretty_print(
        buffer: &dyn AsRef<[u8]>,
        f: &mut fmt::Formatter,
        indent: &mut PrettyIndent,
    ) -> fmt::Result {
        let packet = match Packet::new_checked(buffer.as_ref()) {
            Err(err) => return write!(f, "{indent}({err})"),
            Ok(packet) => packet,
        };
        match Repr::parse(&packet, &ChecksumCapabilities::ignored()) {
            Ok(repr) => write!(f, "{indent}{repr}"),
            Err(err) => write!(f, "{indent}ICMPv4 ({err})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECHO_PACKET_BYTES: [u8; 12] = [
        0x08, 0x00, 0x8e, 0xfe, 0x12, 0x34, 0xab, 0xcd, 0xaa, 0x00, 0x00, 0xff,
    ];

    #[test]
    fn test_echo_deconstruct() {
        let packet = Packet::new_unchecked(&ECHO_PACKET_BYTES[..]);
        assert_eq!(packet.msg_type(), Message::EchoRequest);
        assert_eq!(packet.msg_code(), 0);
        assert_eq!(packet.echo_ident(), 0x1234);
        assert_eq!(packet.echo_seq_no(), 0xabcd);
        assert_eq!(packet.data(), &[0xaa, 0x00, 0x00, 0xff]);
        assert!(packet.verify_checksum());
    }

    #[test]
    fn test_echo_construct() {
        let mut bytes = vec![0xffu8; 12];
        let mut packet = Packet::new_unchecked(&mut bytes);
        let repr = Repr::EchoRequest {
            ident: 0x1234,
            seq_no: 0xabcd,
            data: &[0xaa, 0x00, 0x00, 0xff],
        };
        repr.emit(&mut packet, &ChecksumCapabilities::default());
        assert_eq!(&packet.into_inner()[..], &ECHO_PACKET_BYTES[..]);
    }
}
