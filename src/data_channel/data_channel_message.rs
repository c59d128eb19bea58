use bytes::Bytes;

/// DataChannelMessage is one message carried by a data channel, in either
/// direction. `is_string` marks a text message; otherwise it is binary.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DataChannelMessage {
    pub is_string: bool,
    pub data: Bytes,
}

impl DataChannelMessage {
    pub fn text(s: impl Into<String>) -> Self {
        DataChannelMessage {
            is_string: true,
            data: Bytes::from(s.into()),
        }
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        DataChannelMessage {
            is_string: false,
            data: data.into(),
        }
    }
}
