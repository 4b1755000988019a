//! ISO 7816-4 command framing for the vehicle key applet.

use crate::{Result, TagError};

/// Application identifier of the in-vehicle access applet.
pub const VEHICLE_AID: [u8; 7] = [0xF0, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];

/// Status trailer for a successful command.
pub const STATUS_OK: [u8; 2] = [0x90, 0x00];

/// Status trailer the applet returns when it refuses the selection.
pub const STATUS_FAILED: [u8; 2] = [0x6F, 0x00];

/// Build a SELECT-by-AID command: `00 A4 04 00 <Lc> <AID> 00`.
///
/// The AID must fit the short-form Lc byte (ISO 7816-4 caps AIDs at 16
/// bytes anyway).
pub fn select_command(aid: &[u8]) -> Vec<u8> {
    debug_assert!(aid.len() <= 255, "AID does not fit a short-form Lc byte");
    let mut apdu = Vec::with_capacity(6 + aid.len());
    apdu.extend_from_slice(&[0x00, 0xA4, 0x04, 0x00, aid.len() as u8]);
    apdu.extend_from_slice(aid);
    apdu.push(0x00);
    apdu
}

/// Split a response into its data body and two-byte status trailer.
pub fn split_trailer(response: &[u8]) -> Result<(&[u8], [u8; 2])> {
    if response.len() < 2 {
        return Err(TagError::MalformedResponse(format!(
            "response too short: {} bytes",
            response.len()
        )));
    }
    let (body, trailer) = response.split_at(response.len() - 2);
    Ok((body, [trailer[0], trailer[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_frames_the_vehicle_aid() {
        let apdu = select_command(&VEHICLE_AID);
        assert_eq!(
            apdu,
            vec![0x00, 0xA4, 0x04, 0x00, 0x07, 0xF0, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x00]
        );
    }

    #[test]
    #[should_panic(expected = "short-form Lc")]
    fn oversized_aid_is_refused() {
        select_command(&[0xA5; 256]);
    }

    #[test]
    fn trailer_is_split_from_the_body() {
        let (body, trailer) = split_trailer(&[0xDE, 0xAD, 0x90, 0x00]).unwrap();
        assert_eq!(body, &[0xDE, 0xAD]);
        assert_eq!(trailer, STATUS_OK);
    }

    #[test]
    fn bare_trailer_has_empty_body() {
        let (body, trailer) = split_trailer(&STATUS_FAILED).unwrap();
        assert!(body.is_empty());
        assert_eq!(trailer, STATUS_FAILED);
    }

    #[test]
    fn one_byte_response_is_malformed() {
        assert!(matches!(
            split_trailer(&[0x90]),
            Err(TagError::MalformedResponse(_))
        ));
    }
}
