//! Wire message types for the RAN routing stream protocol.
//!
//! The protocol is a closed, versioned set of message variants exchanged over
//! the upstream and downstream streams. Every frame carries one JSON object
//! tagged with an explicit `MessageType` discriminator; field names follow the
//! protocol's PascalCase spelling (`TransactionID`, `DevEUIs`, `MICChallenge`,
//! ...). Unknown fields are ignored on decode for forward compatibility; an
//! unknown `MessageType` is a fatal decode error.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol version stamped on every outbound message.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum number of GPS-time slots in a Class B transmission window.
pub const MAX_TMMS_SLOTS: usize = 8;

/// Maximum Class C deadline, in seconds from issue time.
pub const MAX_DEADLINE_SECONDS: u64 = 512;

/// Caller-scoped correlation identifier linking a request to its replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<u64> for TransactionId {
    fn from(value: u64) -> Self { Self(value) }
}

/// 64-bit globally unique end-device identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevEui(pub u64);

impl fmt::Display for DevEui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:016x}", self.0) }
}

impl From<u64> for DevEui {
    fn from(value: u64) -> Self { Self(value) }
}

/// 32-bit network-assigned, potentially shared device address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevAddr(pub u32);

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:08x}", self.0) }
}

impl From<u32> for DevAddr {
    fn from(value: u32) -> Self { Self(value) }
}

/// 32-bit multicast group address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MulticastAddr(pub u32);

impl fmt::Display for MulticastAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:08x}", self.0) }
}

impl From<u32> for MulticastAddr {
    fn from(value: u32) -> Self { Self(value) }
}

/// Message Integrity Code candidate or resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mic(pub u32);

impl fmt::Display for Mic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:08x}", self.0) }
}

impl From<u32> for Mic {
    fn from(value: u32) -> Self { Self(value) }
}

/// Domain validation failures raised at the message boundary.
///
/// These are rejected before anything reaches the wire; on decode they are
/// wrapped into a codec error and are fatal to the connection that received
/// the malformed frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    /// An upstream message must name at least one candidate device.
    #[error("DevEUIs must not be empty")]
    EmptyDevEuis,
    /// The MIC challenge list must offer at least one candidate.
    #[error("MICChallenge must not be empty")]
    EmptyMicChallenge,
    /// Exactly one modulation variant must be present.
    #[error("exactly one modulation must be present, found {0}")]
    ModulationArity(usize),
    /// Exactly one transmission timing mode must be present.
    #[error("exactly one of Delay, TMMS or Deadline must be present, found {0}")]
    TimingArity(usize),
    /// Class A delay is limited to 1..=15 receive windows.
    #[error("delay {0} outside 1..=15")]
    DelayOutOfRange(u8),
    /// Class B windows carry between 1 and 8 GPS-time slots.
    #[error("TMMS slot count {0} outside 1..={MAX_TMMS_SLOTS}")]
    TmmsSlotCount(usize),
    /// Class C deadline is bounded by [`MAX_DEADLINE_SECONDS`].
    #[error("deadline {0}s outside 1..={MAX_DEADLINE_SECONDS}s")]
    DeadlineOutOfRange(u64),
    /// LoRa spreading factor is bounded by 12.
    #[error("spreading factor {0} exceeds 12")]
    SpreadingOutOfRange(u8),
}

/// Radio modulation parameters; exactly one variant per transmission.
#[derive(Clone, Debug, PartialEq)]
pub enum Modulation {
    /// LoRa chirp spread spectrum.
    Lora {
        /// Spreading factor, at most 12.
        spreading: u8,
        /// Bandwidth in Hz.
        bandwidth: u32,
    },
    /// Frequency-shift keying.
    Fsk {
        /// Frequency deviation in Hz.
        frequency_deviation: u32,
        /// Bit rate in bit/s.
        bit_rate: u32,
    },
    /// Frequency-hopping spread spectrum.
    Fhss {
        /// Operating channel width in Hz.
        ocw: u32,
        /// Coding rate, e.g. `"4/6"`.
        coding_rate: String,
    },
}

impl Modulation {
    /// LoRa modulation with a validated spreading factor.
    ///
    /// # Errors
    /// Returns [`DomainError::SpreadingOutOfRange`] when `spreading > 12`.
    pub fn lora(spreading: u8, bandwidth: u32) -> Result<Self, DomainError> {
        if spreading > 12 {
            return Err(DomainError::SpreadingOutOfRange(spreading));
        }
        Ok(Self::Lora {
            spreading,
            bandwidth,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct LoraWire {
    #[serde(rename = "Spreading")]
    spreading: u8,
    #[serde(rename = "Bandwidth")]
    bandwidth: u32,
}

#[derive(Serialize, Deserialize)]
struct FskWire {
    #[serde(rename = "FrequencyDeviation")]
    frequency_deviation: u32,
    #[serde(rename = "BitRate")]
    bit_rate: u32,
}

#[derive(Serialize, Deserialize)]
struct FhssWire {
    #[serde(rename = "Ocw")]
    ocw: u32,
    #[serde(rename = "CodingRate")]
    coding_rate: String,
}

/// Wire shape shared by both radio records: three optional modulation arms of
/// which exactly one must be present.
#[derive(Serialize, Deserialize)]
struct ModulationWire {
    #[serde(rename = "LoRa", skip_serializing_if = "Option::is_none", default)]
    lora: Option<LoraWire>,
    #[serde(rename = "FSK", skip_serializing_if = "Option::is_none", default)]
    fsk: Option<FskWire>,
    #[serde(rename = "FHSS", skip_serializing_if = "Option::is_none", default)]
    fhss: Option<FhssWire>,
}

impl From<&Modulation> for ModulationWire {
    fn from(value: &Modulation) -> Self {
        let mut wire = Self {
            lora: None,
            fsk: None,
            fhss: None,
        };
        match value {
            Modulation::Lora {
                spreading,
                bandwidth,
            } => {
                wire.lora = Some(LoraWire {
                    spreading: *spreading,
                    bandwidth: *bandwidth,
                });
            }
            Modulation::Fsk {
                frequency_deviation,
                bit_rate,
            } => {
                wire.fsk = Some(FskWire {
                    frequency_deviation: *frequency_deviation,
                    bit_rate: *bit_rate,
                });
            }
            Modulation::Fhss { ocw, coding_rate } => {
                wire.fhss = Some(FhssWire {
                    ocw: *ocw,
                    coding_rate: coding_rate.clone(),
                });
            }
        }
        wire
    }
}

impl TryFrom<ModulationWire> for Modulation {
    type Error = DomainError;

    fn try_from(wire: ModulationWire) -> Result<Self, Self::Error> {
        let arity = usize::from(wire.lora.is_some())
            + usize::from(wire.fsk.is_some())
            + usize::from(wire.fhss.is_some());
        if arity != 1 {
            return Err(DomainError::ModulationArity(arity));
        }
        if let Some(lora) = wire.lora {
            return Self::lora(lora.spreading, lora.bandwidth);
        }
        if let Some(fsk) = wire.fsk {
            return Ok(Self::Fsk {
                frequency_deviation: fsk.frequency_deviation,
                bit_rate: fsk.bit_rate,
            });
        }
        let fhss = wire.fhss.ok_or(DomainError::ModulationArity(0))?;
        Ok(Self::Fhss {
            ocw: fhss.ocw,
            coding_rate: fhss.coding_rate,
        })
    }
}

/// Radio transmission parameters attached to a downstream window.
#[derive(Clone, Debug, PartialEq)]
pub struct DownstreamRadio {
    /// Carrier frequency in Hz.
    pub frequency: u64,
    /// Modulation variant.
    pub modulation: Modulation,
}

#[derive(Serialize, Deserialize)]
struct DownstreamRadioWire {
    #[serde(rename = "Frequency")]
    frequency: u64,
    #[serde(flatten)]
    modulation: ModulationWire,
}

impl Serialize for DownstreamRadio {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DownstreamRadioWire {
            frequency: self.frequency,
            modulation: (&self.modulation).into(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DownstreamRadio {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = DownstreamRadioWire::deserialize(deserializer)?;
        Ok(Self {
            frequency: wire.frequency,
            modulation: wire
                .modulation
                .try_into()
                .map_err(serde::de::Error::custom)?,
        })
    }
}

/// Radio reception metadata reported with an upstream message.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamRadio {
    /// Carrier frequency in Hz.
    pub frequency: u64,
    /// Modulation variant.
    pub modulation: Modulation,
    /// Received signal strength indicator, dBm.
    pub rssi: f64,
    /// Signal-to-noise ratio, dB.
    pub snr: f64,
}

#[derive(Serialize, Deserialize)]
struct UpstreamRadioWire {
    #[serde(rename = "Frequency")]
    frequency: u64,
    #[serde(flatten)]
    modulation: ModulationWire,
    #[serde(rename = "RSSI")]
    rssi: f64,
    #[serde(rename = "SNR")]
    snr: f64,
}

impl Serialize for UpstreamRadio {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        UpstreamRadioWire {
            frequency: self.frequency,
            modulation: (&self.modulation).into(),
            rssi: self.rssi,
            snr: self.snr,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UpstreamRadio {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = UpstreamRadioWire::deserialize(deserializer)?;
        Ok(Self {
            frequency: wire.frequency,
            modulation: wire
                .modulation
                .try_into()
                .map_err(serde::de::Error::custom)?,
            rssi: wire.rssi,
            snr: wire.snr,
        })
    }
}

/// Timing mode of a transmission window; exactly one per window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxTiming {
    /// Class A: receive windows relative to the last acknowledged upstream
    /// for the same device, resolved by the network.
    Delay(u8),
    /// Class B: ordered absolute GPS-time slots, up to [`MAX_TMMS_SLOTS`]
    /// entries.
    Tmms(Vec<u64>),
    /// Class C: absolute deadline, seconds from issue time, at most
    /// [`MAX_DEADLINE_SECONDS`].
    Deadline(u64),
}

impl TxTiming {
    /// Class A delay, validated to 1..=15.
    ///
    /// # Errors
    /// Returns [`DomainError::DelayOutOfRange`] outside that range.
    pub fn delay(windows: u8) -> Result<Self, DomainError> {
        if windows == 0 || windows > 15 {
            return Err(DomainError::DelayOutOfRange(windows));
        }
        Ok(Self::Delay(windows))
    }

    /// Class B slot list, validated to 1..=[`MAX_TMMS_SLOTS`] entries.
    ///
    /// # Errors
    /// Returns [`DomainError::TmmsSlotCount`] when empty or oversized.
    pub fn tmms(slots: Vec<u64>) -> Result<Self, DomainError> {
        if slots.is_empty() || slots.len() > MAX_TMMS_SLOTS {
            return Err(DomainError::TmmsSlotCount(slots.len()));
        }
        Ok(Self::Tmms(slots))
    }

    /// Class C deadline, validated to 1..=[`MAX_DEADLINE_SECONDS`] seconds.
    ///
    /// # Errors
    /// Returns [`DomainError::DeadlineOutOfRange`] outside that range.
    pub fn deadline(seconds: u64) -> Result<Self, DomainError> {
        if seconds == 0 || seconds > MAX_DEADLINE_SECONDS {
            return Err(DomainError::DeadlineOutOfRange(seconds));
        }
        Ok(Self::Deadline(seconds))
    }
}

/// Transmission window for a downstream message: radio parameters plus
/// exactly one timing mode.
#[derive(Clone, Debug, PartialEq)]
pub struct TransmissionWindow {
    /// Radio transmission parameters.
    pub radio: DownstreamRadio,
    /// Timing mode.
    pub timing: TxTiming,
}

#[derive(Serialize, Deserialize)]
struct TransmissionWindowWire {
    #[serde(rename = "Radio")]
    radio: DownstreamRadio,
    #[serde(rename = "Delay", skip_serializing_if = "Option::is_none", default)]
    delay: Option<u8>,
    #[serde(rename = "Tmms", skip_serializing_if = "Option::is_none", default)]
    tmms: Option<Vec<u64>>,
    #[serde(rename = "Deadline", skip_serializing_if = "Option::is_none", default)]
    deadline: Option<u64>,
}

impl Serialize for TransmissionWindow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut wire = TransmissionWindowWire {
            radio: self.radio.clone(),
            delay: None,
            tmms: None,
            deadline: None,
        };
        match &self.timing {
            TxTiming::Delay(windows) => wire.delay = Some(*windows),
            TxTiming::Tmms(slots) => wire.tmms = Some(slots.clone()),
            TxTiming::Deadline(seconds) => wire.deadline = Some(*seconds),
        }
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TransmissionWindow {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = TransmissionWindowWire::deserialize(deserializer)?;
        let arity = usize::from(wire.delay.is_some())
            + usize::from(wire.tmms.is_some())
            + usize::from(wire.deadline.is_some());
        if arity != 1 {
            return Err(serde::de::Error::custom(DomainError::TimingArity(arity)));
        }
        let timing = if let Some(windows) = wire.delay {
            TxTiming::delay(windows)
        } else if let Some(slots) = wire.tmms {
            TxTiming::tmms(slots)
        } else if let Some(seconds) = wire.deadline {
            TxTiming::deadline(seconds)
        } else {
            Err(DomainError::TimingArity(0))
        }
        .map_err(serde::de::Error::custom)?;
        Ok(Self {
            radio: wire.radio,
            timing,
        })
    }
}

/// Reason an upstream message was rejected by the consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpstreamRejectCode {
    /// No offered MIC candidate matched the device session keys.
    MICFailed,
    /// Any other processing failure.
    Other,
}

/// Terminal status of a downstream transmission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownstreamResultCode {
    /// The payload was transmitted.
    Success,
    /// No suitable transmission window could be scheduled.
    WindowNotFound,
    /// No gateway currently serves the target device.
    GatewayNotFound,
    /// The requested window had already passed.
    TooLate,
    /// The device did not confirm reception.
    NoAck,
    /// The gateway failed while transmitting.
    GatewayError,
}

impl DownstreamResultCode {
    /// Whether this code reports a delivered transmission.
    #[must_use]
    pub fn is_success(self) -> bool { matches!(self, Self::Success) }
}

/// GPS fix reported by the receiving gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gps {
    /// Latitude in decimal degrees.
    #[serde(rename = "Lat")]
    pub lat: f64,
    /// Longitude in decimal degrees.
    #[serde(rename = "Lng")]
    pub lng: f64,
    /// Altitude in metres, when known.
    #[serde(rename = "Alt", skip_serializing_if = "Option::is_none", default)]
    pub alt: Option<f64>,
}

/// Device-to-network traffic offered to the LNS, with the MIC detached and a
/// list of candidate MIC values standing in for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMessage {
    /// Protocol version of the sender.
    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: u32,
    /// Unique per-message identifier, scoped to the upstream stream.
    #[serde(rename = "TransactionID")]
    pub transaction_id: TransactionId,
    /// Set when the RAN believes the frame may be stale.
    #[serde(rename = "Outdated", skip_serializing_if = "Option::is_none", default)]
    pub outdated: Option<bool>,
    /// Candidate devices; more than one when a DevAddr is shared.
    #[serde(rename = "DevEUIs")]
    pub dev_euis: Vec<DevEui>,
    /// Reception metadata.
    #[serde(rename = "Radio")]
    pub radio: UpstreamRadio,
    /// PHY payload with the MIC stripped.
    #[serde(rename = "PHYPayloadNoMIC")]
    pub phy_payload_no_mic: Vec<u8>,
    /// Ordered MIC challenge candidates.
    #[serde(rename = "MICChallenge")]
    pub mic_challenge: Vec<Mic>,
    /// Gateway GPS fix, when available.
    #[serde(rename = "Gps", skip_serializing_if = "Option::is_none", default)]
    pub gps: Option<Gps>,
}

/// Confirms an upstream message, naming the resolved device and MIC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamAckMessage {
    /// Protocol version of the sender.
    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: u32,
    /// Transaction identifier of the acknowledged upstream message.
    #[serde(rename = "TransactionID")]
    pub transaction_id: TransactionId,
    /// The device the LNS resolved the traffic to.
    #[serde(rename = "DevEUI")]
    pub dev_eui: DevEui,
    /// The MIC candidate the LNS confirmed.
    #[serde(rename = "MIC")]
    pub mic: Mic,
}

/// Declines an upstream message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRejectMessage {
    /// Protocol version of the sender.
    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: u32,
    /// Transaction identifier of the rejected upstream message.
    #[serde(rename = "TransactionID")]
    pub transaction_id: TransactionId,
    /// Rejection reason.
    #[serde(rename = "ResultCode")]
    pub result_code: UpstreamRejectCode,
    /// Optional human-readable explanation.
    #[serde(rename = "ResultMessage", skip_serializing_if = "Option::is_none", default)]
    pub result_message: Option<String>,
}

/// Network-to-device payload targeting a single device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownstreamMessage {
    /// Protocol version of the sender.
    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: u32,
    /// LNS-chosen identifier, unique within the downstream session.
    #[serde(rename = "TransactionID")]
    pub transaction_id: TransactionId,
    /// Target device.
    #[serde(rename = "DevEUI")]
    pub dev_eui: DevEui,
    /// Mandatory for join-accept payloads; updates the RAN routing state.
    #[serde(rename = "TargetDevAddr", skip_serializing_if = "Option::is_none", default)]
    pub target_dev_addr: Option<DevAddr>,
    /// Transmission window.
    #[serde(rename = "TxWindow")]
    pub tx_window: TransmissionWindow,
    /// Full PHY payload bytes.
    #[serde(rename = "PHYPayload")]
    pub phy_payload: Vec<u8>,
}

/// Network-to-device payload targeting a multicast group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MulticastDownstreamMessage {
    /// Protocol version of the sender.
    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: u32,
    /// LNS-chosen identifier, unique within the downstream session.
    #[serde(rename = "TransactionID")]
    pub transaction_id: TransactionId,
    /// Target multicast group address.
    #[serde(rename = "Addr")]
    pub addr: MulticastAddr,
    /// Transmission window.
    #[serde(rename = "TxWindow")]
    pub tx_window: TransmissionWindow,
    /// Full PHY payload bytes.
    #[serde(rename = "PHYPayload")]
    pub phy_payload: Vec<u8>,
}

/// First reply to a downstream submission: the message was accepted and
/// assigned a mailbox for status lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamAckMessage {
    /// Protocol version of the sender.
    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: u32,
    /// Transaction identifier of the submitted downstream message.
    #[serde(rename = "TransactionID")]
    pub transaction_id: TransactionId,
    /// Mailbox allocated by the network.
    #[serde(rename = "MailboxID")]
    pub mailbox_id: u64,
}

/// Terminal reply to a downstream submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamResultMessage {
    /// Protocol version of the sender.
    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: u32,
    /// Transaction identifier of the submitted downstream message.
    #[serde(rename = "TransactionID")]
    pub transaction_id: TransactionId,
    /// Terminal status.
    #[serde(rename = "ResultCode")]
    pub result_code: DownstreamResultCode,
    /// Human-readable status message.
    #[serde(rename = "ResultMessage")]
    pub result_message: String,
    /// Mailbox named by the matching ack.
    #[serde(rename = "MailboxID")]
    pub mailbox_id: u64,
}

/// The closed set of stream protocol messages, keyed by the `MessageType`
/// discriminator on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "MessageType")]
pub enum WireMessage {
    /// Device-to-network traffic (RAN → LNS on the upstream stream).
    Upstream(UpstreamMessage),
    /// Upstream acknowledgment (LNS → RAN).
    UpstreamAck(UpstreamAckMessage),
    /// Upstream rejection (LNS → RAN).
    UpstreamReject(UpstreamRejectMessage),
    /// Downstream submission (LNS → RAN on the downstream stream).
    Downstream(DownstreamMessage),
    /// Multicast downstream submission (LNS → RAN).
    MulticastDownstream(MulticastDownstreamMessage),
    /// Downstream acceptance (RAN → LNS).
    DownstreamAck(DownstreamAckMessage),
    /// Downstream terminal result (RAN → LNS).
    DownstreamResult(DownstreamResultMessage),
}

impl WireMessage {
    /// Transaction identifier carried by this message.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            Self::Upstream(m) => m.transaction_id,
            Self::UpstreamAck(m) => m.transaction_id,
            Self::UpstreamReject(m) => m.transaction_id,
            Self::Downstream(m) => m.transaction_id,
            Self::MulticastDownstream(m) => m.transaction_id,
            Self::DownstreamAck(m) => m.transaction_id,
            Self::DownstreamResult(m) => m.transaction_id,
        }
    }

    /// Wire discriminator name, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "Upstream",
            Self::UpstreamAck(_) => "UpstreamAck",
            Self::UpstreamReject(_) => "UpstreamReject",
            Self::Downstream(_) => "Downstream",
            Self::MulticastDownstream(_) => "MulticastDownstream",
            Self::DownstreamAck(_) => "DownstreamAck",
            Self::DownstreamResult(_) => "DownstreamResult",
        }
    }

    /// Check mandatory-field invariants that serde cannot express.
    ///
    /// # Errors
    /// Returns the violated [`DomainError`].
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Self::Upstream(upstream) = self {
            if upstream.dev_euis.is_empty() {
                return Err(DomainError::EmptyDevEuis);
            }
            if upstream.mic_challenge.is_empty() {
                return Err(DomainError::EmptyMicChallenge);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn lora_radio() -> DownstreamRadio {
        DownstreamRadio {
            frequency: 868_100_000,
            modulation: Modulation::lora(7, 125_000).expect("valid spreading"),
        }
    }

    #[rstest]
    #[case(0)]
    #[case(16)]
    fn delay_outside_range_is_rejected(#[case] windows: u8) {
        assert_eq!(
            TxTiming::delay(windows),
            Err(DomainError::DelayOutOfRange(windows))
        );
    }

    #[test]
    fn tmms_slot_count_is_bounded() {
        assert_eq!(TxTiming::tmms(vec![]), Err(DomainError::TmmsSlotCount(0)));
        assert_eq!(
            TxTiming::tmms(vec![0; MAX_TMMS_SLOTS + 1]),
            Err(DomainError::TmmsSlotCount(MAX_TMMS_SLOTS + 1))
        );
        assert!(TxTiming::tmms(vec![1, 2, 3]).is_ok());
    }

    #[test]
    fn deadline_is_bounded() {
        assert_eq!(
            TxTiming::deadline(MAX_DEADLINE_SECONDS + 1),
            Err(DomainError::DeadlineOutOfRange(MAX_DEADLINE_SECONDS + 1))
        );
        assert!(TxTiming::deadline(MAX_DEADLINE_SECONDS).is_ok());
    }

    #[test]
    fn spreading_factor_is_bounded() {
        assert_eq!(
            Modulation::lora(13, 125_000),
            Err(DomainError::SpreadingOutOfRange(13))
        );
    }

    #[test]
    fn window_with_two_timing_modes_fails_decode() {
        let json = serde_json::json!({
            "Radio": {"Frequency": 868_100_000u64, "LoRa": {"Spreading": 7, "Bandwidth": 125_000}},
            "Delay": 1,
            "Deadline": 10,
        });
        let err = serde_json::from_value::<TransmissionWindow>(json)
            .expect_err("two timing modes must be rejected");
        assert!(err.to_string().contains("exactly one of"));
    }

    #[test]
    fn window_with_no_timing_mode_fails_decode() {
        let json = serde_json::json!({
            "Radio": {
                "Frequency": 868_100_000u64,
                "FSK": {"FrequencyDeviation": 25_000, "BitRate": 50_000},
            },
        });
        assert!(serde_json::from_value::<TransmissionWindow>(json).is_err());
    }

    #[test]
    fn radio_with_two_modulations_fails_decode() {
        let json = serde_json::json!({
            "Frequency": 868_100_000u64,
            "LoRa": {"Spreading": 7, "Bandwidth": 125_000},
            "FSK": {"FrequencyDeviation": 25_000, "BitRate": 50_000},
        });
        assert!(serde_json::from_value::<DownstreamRadio>(json).is_err());
    }

    #[test]
    fn window_round_trips_each_timing_mode() {
        for timing in [
            TxTiming::delay(1).expect("delay"),
            TxTiming::tmms(vec![1_000, 2_000]).expect("tmms"),
            TxTiming::deadline(512).expect("deadline"),
        ] {
            let window = TransmissionWindow {
                radio: lora_radio(),
                timing,
            };
            let json = serde_json::to_value(&window).expect("serialize window");
            let back: TransmissionWindow = serde_json::from_value(json).expect("deserialize window");
            assert_eq!(back, window);
        }
    }

    #[test]
    fn upstream_validation_requires_candidates() {
        let message = WireMessage::Upstream(UpstreamMessage {
            protocol_version: PROTOCOL_VERSION,
            transaction_id: TransactionId(1),
            outdated: None,
            dev_euis: vec![],
            radio: UpstreamRadio {
                frequency: 868_100_000,
                modulation: Modulation::lora(7, 125_000).expect("valid spreading"),
                rssi: -120.0,
                snr: 5.5,
            },
            phy_payload_no_mic: vec![1, 2, 3],
            mic_challenge: vec![Mic(1), Mic(2)],
            gps: None,
        });
        assert_eq!(message.validate(), Err(DomainError::EmptyDevEuis));
    }
}
