use bytes::{BufMut, Bytes, BytesMut};
use rtp::packetizer::Payloader;

use super::nal_unit_separator::NalUnitSeparator;

const H265_NALU_HEADER_SIZE: usize = 2;
const H265_FU_HEADER_SIZE: usize = 1;
/// <https://datatracker.ietf.org/doc/html/rfc7798#section-4.4.3>
const H265_FU_NALU_TYPE: u8 = 49;

const H265_F_LAYER_ID_MSB_BITMASK: u8 = 0b1000_0001;
const H265_FU_START_BITMASK: u8 = 0x80;
const H265_FU_END_BITMASK: u8 = 0x40;

/// H265Payloader payloads H265 access units given in Annex-B form, as
/// single NAL unit packets or fragmentation units (RFC 7798).
#[derive(Default, Debug, Clone)]
pub(crate) struct H265Payloader;

impl H265Payloader {
    fn emit(nalu: &Bytes, mtu: usize, payloads: &mut Vec<Bytes>) {
        if nalu.len() < H265_NALU_HEADER_SIZE {
            return;
        }

        if nalu.len() <= mtu {
            payloads.push(nalu.clone());
            return;
        }

        let max_fragment_size =
            match mtu.checked_sub(H265_NALU_HEADER_SIZE + H265_FU_HEADER_SIZE) {
                Some(size) if size > 0 => size,
                _ => return,
            };

        // +---------------+---------------+
        // |0|1|2|3|4|5|6|7|0|1|2|3|4|5|6|7|
        // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        // |F|  Type=49  |  LayerId  | TID |
        // +-------------+-----------------+
        let payload_header = [
            (nalu[0] & H265_F_LAYER_ID_MSB_BITMASK) | (H265_FU_NALU_TYPE << 1),
            nalu[1],
        ];
        let nalu_type = (nalu[0] >> 1) & 0x3F;

        // the NAL unit header travels in the payload header and FU header
        let data = nalu.slice(H265_NALU_HEADER_SIZE..);
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + max_fragment_size).min(data.len());

            // +---------------+
            // |0|1|2|3|4|5|6|7|
            // +-+-+-+-+-+-+-+-+
            // |S|E|  FuType   |
            // +---------------+
            let mut fu_header = nalu_type;
            if offset == 0 {
                fu_header |= H265_FU_START_BITMASK;
            } else if end == data.len() {
                fu_header |= H265_FU_END_BITMASK;
            }

            let mut out =
                BytesMut::with_capacity(H265_NALU_HEADER_SIZE + H265_FU_HEADER_SIZE + end - offset);
            out.put_slice(&payload_header);
            out.put_u8(fu_header);
            out.put_slice(&data[offset..end]);
            payloads.push(out.freeze());

            offset = end;
        }
    }
}

impl Payloader for H265Payloader {
    fn payload(&mut self, mtu: usize, payload: &Bytes) -> Result<Vec<Bytes>, rtp::Error> {
        if payload.is_empty() || mtu == 0 {
            return Ok(vec![]);
        }

        let mut payloads = vec![];
        for nalu in NalUnitSeparator::StartSequence.split(payload) {
            H265Payloader::emit(&nalu, mtu, &mut payloads);
        }
        Ok(payloads)
    }

    fn clone_to(&self) -> Box<dyn Payloader + Send + Sync> {
        Box::new(self.clone())
    }
}
