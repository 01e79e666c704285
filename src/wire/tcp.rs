use byteorder::{ByteOrder, NetworkEndian};
use core::{cmp, fmt, ops};

use super::{Error, Result};
use crate::phy::ChecksumCapabilities;
use crate::wire::ip::checksum;
use crate::wire::IpAddress;

/// A TCP sequence number.
///
/// Sequence space is a 32-bit ring; comparisons must account for wraparound,
/// which is why `SeqNumber` does not derive `Ord` and instead implements a
/// signed-distance comparison (RFC 793 §3.3).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeqNumber(pub i32);

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(rhs as i32))
    }
}

impl ops::Sub<SeqNumber> for SeqNumber {
    type Output = isize;

    fn sub(self, rhs: SeqNumber) -> isize {
        (self.0.wrapping_sub(rhs.0)) as isize
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        (self.0.wrapping_sub(other.0)).partial_cmp(&0)
    }
}

impl SeqNumber {
    /// Return `true` if `self` is strictly between `start` and `end`,
    /// i.e. inside the half-open window `(start, end]`, accounting for wraparound.
    pub fn in_window(&self, start: SeqNumber, end: SeqNumber) -> bool {
        *self > start && *self <= end
    }
}

/// TCP control flags, carried by a segment in addition to any payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    None,
    Syn,
    Fin,
    Rst,
}

impl Control {
    /// Whether this control occupies one byte of sequence space.
    pub const fn len(self) -> usize {
        match self {
            Control::Syn | Control::Fin => 1,
            _ => 0,
        }
    }
}

/// A TCP option, either the one kind this stack emits or an opaque one it
/// preserves the length of while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpOption<'a> {
    EndOfList,
    NoOperation,
    MaxSegmentSize(u16),
    WindowScale(u8),
    Unknown { kind: u8, data: &'a [u8] },
}

impl<'a> TcpOption<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<(&'a [u8], TcpOption<'a>)> {
        let (length, option);
        match *buffer.first().ok_or(Error)? {
            field::OPT_END => {
                length = 1;
                option = TcpOption::EndOfList;
            }
            field::OPT_NOP => {
                length = 1;
                option = TcpOption::NoOperation;
            }
            kind => {
                length = *buffer.get(1).ok_or(Error)? as usize;
                let contents = buffer.get(2..length).ok_or(Error)?;
                option = match (kind, length) {
                    (field::OPT_MSS, 4) => {
                        TcpOption::MaxSegmentSize(NetworkEndian::read_u16(contents))
                    }
                    (field::OPT_WS, 3) => TcpOption::WindowScale(contents[0]),
                    (_, _) => TcpOption::Unknown { kind, data: contents },
                }
            }
        }
        Ok((buffer.get(length..).ok_or(Error)?, option))
    }

    pub fn buffer_len(&self) -> usize {
        match self {
            TcpOption::EndOfList | TcpOption::NoOperation => 1,
            TcpOption::MaxSegmentSize(_) => 4,
            TcpOption::WindowScale(_) => 3,
            TcpOption::Unknown { data, .. } => 2 + data.len(),
        }
    }

    pub fn emit(&self, buffer: &mut [u8]) -> &mut [u8] {
        let length;
        match *self {
            TcpOption::EndOfList => {
                length = 1;
                buffer[0] = field::OPT_END;
            }
            TcpOption::NoOperation => {
                length = 1;
                buffer[0] = field::OPT_NOP;
            }
            TcpOption::MaxSegmentSize(value) => {
                length = 4;
                buffer[0] = field::OPT_MSS;
                buffer[1] = length as u8;
                NetworkEndian::write_u16(&mut buffer[2..4], value);
            }
            TcpOption::WindowScale(value) => {
                length = 3;
                buffer[0] = field::OPT_WS;
                buffer[1] = length as u8;
                buffer[2] = value;
            }
            TcpOption::Unknown { kind, data } => {
                length = 2 + data.len();
                buffer[0] = kind;
                buffer[1] = length as u8;
                buffer[2..length].copy_from_slice(data);
            }
        }
        &mut buffer[length..]
    }
}

mod field {
    use crate::wire::field::*;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const SEQ_NUM: Field = 4..8;
    pub const ACK_NUM: Field = 8..12;
    pub const FLAGS: Field = 12..14;
    pub const WIN_SIZE: Field = 14..16;
    pub const CHECKSUM: Field = 16..18;
    pub const URGENT: Field = 18..20;

    pub const OPT_END: u8 = 0x00;
    pub const OPT_NOP: u8 = 0x01;
    pub const OPT_MSS: u8 = 0x02;
    pub const OPT_WS: u8 = 0x03;

    pub const fn OPTIONS(data_offset: u8) -> Field {
        URGENT.end..(data_offset as usize * 4)
    }
}

pub const HEADER_LEN: usize = field::URGENT.end;

const FIN_MASK: u16 = 0x001;
const SYN_MASK: u16 = 0x002;
const RST_MASK: u16 = 0x004;
const PSH_MASK: u16 = 0x008;
const ACK_MASK: u16 = 0x010;
const URG_MASK: u16 = 0x020;

/// A read/write wrapper around a Transmission Control Protocol segment buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with TCP segment structure.
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
    /// Returns `Err(Error)` if the buffer is too short, or if the data offset
    /// field points beyond the end of the buffer.
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            return Err(Error);
        }
        let data_offset = self.data_offset();
        if usize::from(data_offset) < HEADER_LEN / 4 || usize::from(data_offset) * 4 > len {
            return Err(Error);
        }
        Ok(())
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::SRC_PORT])
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::DST_PORT])
    }

    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.buffer.as_ref()[field::SEQ_NUM]))
    }

    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.buffer.as_ref()[field::ACK_NUM]))
    }

    #[inline]
    pub fn data_offset(&self) -> u8 {
        self.buffer.as_ref()[field::FLAGS.start] >> 4
    }

    #[inline]
    fn flags(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::FLAGS]) & 0x0fff
    }

    #[inline]
    pub fn fin(&self) -> bool {
        self.flags() & FIN_MASK != 0
    }
    #[inline]
    pub fn syn(&self) -> bool {
        self.flags() & SYN_MASK != 0
    }
    #[inline]
    pub fn rst(&self) -> bool {
        self.flags() & RST_MASK != 0
    }
    #[inline]
    pub fn psh(&self) -> bool {
        self.flags() & PSH_MASK != 0
    }
    #[inline]
    pub fn ack(&self) -> bool {
        self.flags() & ACK_MASK != 0
    }
    #[inline]
    pub fn urg(&self) -> bool {
        self.flags() & URG_MASK != 0
    }

    #[inline]
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::WIN_SIZE])
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CHECKSUM])
    }

    #[inline]
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::URGENT])
    }

    /// Return the control flag carried by this segment.
    ///
    /// A segment must never carry more than one of SYN/FIN/RST; this
    /// prefers RST, then SYN, then FIN, matching common stack behaviour
    /// when fed a malformed combination.
    pub fn control(&self) -> Control {
        if self.rst() {
            Control::Rst
        } else if self.syn() {
            Control::Syn
        } else if self.fin() {
            Control::Fin
        } else {
            Control::None
        }
    }

    pub fn verify_checksum(&self, src_addr: &IpAddress, dst_addr: &IpAddress) -> bool {
        let data = self.buffer.as_ref();
        checksum::combine(&[
            checksum::pseudo_header(
                src_addr,
                dst_addr,
                crate::wire::IpProtocol::Tcp,
                data.len() as u32,
            ),
            checksum::data(data),
        ]) == !0
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let data_offset = self.data_offset();
        &self.buffer.as_ref()[usize::from(data_offset) * 4..]
    }

    pub fn options(&self) -> &'a [u8] {
        let data_offset = self.data_offset();
        &self.buffer.as_ref()[field::OPTIONS(data_offset)]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::SRC_PORT], value)
    }
    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::DST_PORT], value)
    }
    #[inline]
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.buffer.as_mut()[field::SEQ_NUM], value.0)
    }
    #[inline]
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.buffer.as_mut()[field::ACK_NUM], value.0)
    }
    #[inline]
    pub fn set_data_offset(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::FLAGS.start] = (data[field::FLAGS.start] & 0x0f) | (value << 4);
    }

    fn set_flags(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        let raw = NetworkEndian::read_u16(&data[field::FLAGS]);
        NetworkEndian::write_u16(&mut data[field::FLAGS], (raw & 0xf000) | (value & 0x0fff));
    }

    fn set_flag(&mut self, mask: u16, value: bool) {
        let flags = self.flags();
        self.set_flags(if value { flags | mask } else { flags & !mask });
    }

    pub fn set_fin(&mut self, value: bool) {
        self.set_flag(FIN_MASK, value)
    }
    pub fn set_syn(&mut self, value: bool) {
        self.set_flag(SYN_MASK, value)
    }
    pub fn set_rst(&mut self, value: bool) {
        self.set_flag(RST_MASK, value)
    }
    pub fn set_psh(&mut self, value: bool) {
        self.set_flag(PSH_MASK, value)
    }
    pub fn set_ack(&mut self, value: bool) {
        self.set_flag(ACK_MASK, value)
    }
    pub fn set_urg(&mut self, value: bool) {
        self.set_flag(URG_MASK, value)
    }

    pub fn set_control(&mut self, control: Control) {
        self.set_syn(control == Control::Syn);
        self.set_fin(control == Control::Fin);
        self.set_rst(control == Control::Rst);
    }

    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::WIN_SIZE], value)
    }
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value)
    }
    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::URGENT], value)
    }

    pub fn fill_checksum(&mut self, src_addr: &IpAddress, dst_addr: &IpAddress) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::combine(&[
                checksum::pseudo_header(
                    src_addr,
                    dst_addr,
                    crate::wire::IpProtocol::Tcp,
                    data.len() as u32,
                ),
                checksum::data(data),
            ])
        };
        self.set_checksum(checksum)
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let data_offset = self.data_offset();
        &mut self.buffer.as_mut()[usize::from(data_offset) * 4..]
    }

    fn options_mut(&mut self) -> &mut [u8] {
        let data_offset = self.data_offset();
        &mut self.buffer.as_mut()[field::OPTIONS(data_offset)]
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A high-level representation of a Transmission Control Protocol segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub control: Control,
    pub seq_number: SeqNumber,
    pub ack_number: Option<SeqNumber>,
    pub window_len: u16,
    pub max_seg_size: Option<u16>,
    pub payload: &'a [u8],
}

impl<'a> Repr<'a> {
    /// Parse a TCP segment and return a high-level representation.
    pub fn parse<T: AsRef<[u8]> + ?Sized>(
        packet: &Packet<&'a T>,
        src_addr: &IpAddress,
        dst_addr: &IpAddress,
        checksum_caps: &ChecksumCapabilities,
    ) -> Result<Repr<'a>> {
        packet.check_len()?;
        if packet.src_port() == 0 || packet.dst_port() == 0 {
            return Err(Error);
        }
        if checksum_caps.tcp.rx() && !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error);
        }

        let mut max_seg_size = None;
        let mut options = packet.options();
        while !options.is_empty() {
            let (next_options, option) = TcpOption::parse(options)?;
            if let TcpOption::MaxSegmentSize(value) = option {
                max_seg_size = Some(value);
            }
            if option == TcpOption::EndOfList {
                break;
            }
            options = next_options;
        }

        let ack_number = if packet.ack() {
            Some(packet.ack_number())
        } else {
            None
        };

        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            control: packet.control(),
            seq_number: packet.seq_number(),
            ack_number,
            window_len: packet.window_len(),
            max_seg_size,
            payload: packet.payload(),
        })
    }

    /// Length of the sequence space occupied by this segment (SYN and FIN
    /// each count as one octet, per RFC 793).
    pub const fn segment_len(&self) -> usize {
        self.payload.len() + self.control.len()
    }

    /// Length of a header emitted from this representation, including options.
    pub fn header_len(&self) -> usize {
        let mut length = field::URGENT.end;
        if self.max_seg_size.is_some() {
            length += 4;
        }
        if length % 4 != 0 {
            length += 4 - length % 4;
        }
        length
    }

    pub fn buffer_len(&self) -> usize {
        self.header_len() + self.payload.len()
    }

    /// Emit a high-level representation into a TCP segment.
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(
        &self,
        packet: &mut Packet<&mut T>,
        src_addr: &IpAddress,
        dst_addr: &IpAddress,
        checksum_caps: &ChecksumCapabilities,
    ) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number.unwrap_or(SeqNumber(0)));
        packet.set_control(self.control);
        packet.set_ack(self.ack_number.is_some());
        packet.set_window_len(self.window_len);
        packet.set_data_offset((self.header_len() / 4) as u8);
        packet.set_urgent_at(0);
        packet.set_urg(false);
        packet.set_psh(!self.payload.is_empty());

        {
            let mut options = &mut packet.options_mut()[..];
            if let Some(mss) = self.max_seg_size {
                options = TcpOption::MaxSegmentSize(mss).emit(options);
            }
            if !options.is_empty() {
                TcpOption::EndOfList.emit(options);
            }
        }

        packet.payload_mut().copy_from_slice(self.payload);

        if checksum_caps.tcp.tx() {
            packet.fill_checksum(src_addr, dst_addr);
        } else {
            packet.set_checksum(0);
        }
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> fmt::Display for Packet<&'a T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "TCP src={} dst={} seq={}",
            self.src_port(),
            self.dst_port(),
            self.seq_number()
        )?;
        if self.ack() {
            write!(f, " ack={}", self.ack_number())?;
        }
        write!(f, " win={}", self.window_len())
    }
}

impl<'a> fmt::Display for Repr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "TCP src={} dst={} seq={}",
            self.src_port, self.dst_port, self.seq_number
        )?;
        if let Some(ack) = self.ack_number {
            write!(f, " ack={ack}")?;
        }
        write!(f, " win={}", self.window_len)?;
        match self.control {
            Control::Syn => write!(f, " syn")?,
            Control::Fin => write!(f, " fin")?,
            Control::Rst => write!(f, " rst")?,
            Control::None => {}
        }
        if !self.payload.is_empty() {
            write!(f, " len={}", self.payload.len())?;
        }
        Ok(())
    }
}

use crate::wire::pretty_print::{PrettyIndent, PrettyPrint};

impl<T: AsRef<[u8]>> PrettyPrint for Packet<T> {
    fn pretty_print(
        buffer: &dyn AsRef<[u8]>,
        f: &mut fmt::Formatter,
        indent: &mut PrettyIndent,
    ) -> fmt::Result {
        match Packet::new_checked(buffer.as_ref()) {
            Err(err) => write!(f, "{indent}({err})"),
            Ok(packet) => write!(
                f,
                "{indent}TCP src={} dst={} seq={} ack={} win={} len={}",
                packet.src_port(),
                packet.dst_port(),
                packet.seq_number(),
                packet.ack_number(),
                packet.window_len(),
                packet.payload().len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_number_wraps_around() {
        let a = SeqNumber(i32::MAX);
        let b = a + 2;
        assert!(b > a);
        assert_eq!(b - a, 2);
    }

    #[test]
    fn seq_number_in_window() {
        let start = SeqNumber(100);
        let end = SeqNumber(200);
        assert!(SeqNumber(150).in_window(start, end));
        assert!(!SeqNumber(100).in_window(start, end));
        assert!(SeqNumber(200).in_window(start, end));
        assert!(!SeqNumber(201).in_window(start, end));
    }

    const SYN_PACKET_BYTES: [u8; 24] = [
        0xbf, 0x00, 0x00, 0x50, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00, 0x60, 0x02, 0x20,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x04, 0x05, 0xb4,
    ];

    #[test]
    fn test_deconstruct_syn() {
        let packet = Packet::new_unchecked(&SYN_PACKET_BYTES[..]);
        assert_eq!(packet.src_port(), 0xbf00);
        assert_eq!(packet.dst_port(), 80);
        assert_eq!(packet.seq_number(), SeqNumber(0x0102_0304));
        assert!(packet.syn());
        assert!(!packet.ack());
        assert_eq!(packet.window_len(), 0x2000);
        assert_eq!(packet.data_offset(), 6);

        let repr = Repr::parse(
            &packet,
            &IpAddress::v4(192, 168, 1, 1),
            &IpAddress::v4(192, 168, 1, 2),
            &ChecksumCapabilities::ignored(),
        )
        .unwrap();
        assert_eq!(repr.control, Control::Syn);
        assert_eq!(repr.max_seg_size, Some(1460));
    }

    #[test]
    fn test_construct_syn() {
        let repr = Repr {
            src_port: 0xbf00,
            dst_port: 80,
            control: Control::Syn,
            seq_number: SeqNumber(0x0102_0304),
            ack_number: None,
            window_len: 0x2000,
            max_seg_size: Some(1460),
            payload: &[],
        };
        let mut bytes = vec![0xffu8; repr.buffer_len()];
        let mut packet = Packet::new_unchecked(&mut bytes);
        repr.emit(
            &mut packet,
            &IpAddress::v4(192, 168, 1, 1),
            &IpAddress::v4(192, 168, 1, 2),
            &ChecksumCapabilities::ignored(),
        );
        assert_eq!(&bytes[..20], &SYN_PACKET_BYTES[..20]);
    }
}
