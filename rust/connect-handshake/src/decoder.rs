//! Turns transport payloads into [`ConnectionRequest`]s.

use connect_agent::RequestSource;
use connect_protocol::{ConnectionRequest, InboundMessage};
use url::Url;

use crate::DecodeError;

/// Query parameter naming the location of the sealed request.
pub const REQUEST_URI_PARAMETER: &str = "request_uri";
/// Query parameter carrying the key the request is sealed with.
pub const ENCRYPTION_KEY_PARAMETER: &str = "encryption_key";

/// Parameters carried by a scanned QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrParameters {
    /// Where the sealed request is published
    pub request_uri: String,
    /// Transport-encoded symmetric key
    pub encryption_key: String,
}

impl QrParameters {
    /// Read the parameters from a scanned URI of any scheme.
    pub fn parse(uri: &str) -> Result<Self, DecodeError> {
        let url = Url::parse(uri.trim()).map_err(|error| DecodeError::Invalid(error.to_string()))?;

        let parameter = |name: &'static str| {
            url.query_pairs()
                .find(|(key, value)| key == name && !value.is_empty())
                .map(|(_, value)| value.into_owned())
                .ok_or(DecodeError::MissingParameter(name))
        };

        Ok(Self {
            request_uri: parameter(REQUEST_URI_PARAMETER)?,
            encryption_key: parameter(ENCRYPTION_KEY_PARAMETER)?,
        })
    }
}

/// Decode a scanned QR URI: read its parameters, then fetch and open the
/// sealed request through `source`.
pub async fn decode_qr<S>(source: &S, uri: &str) -> Result<ConnectionRequest, DecodeError>
where
    S: RequestSource + ?Sized,
{
    let parameters = QrParameters::parse(uri)?;
    let request = source
        .decrypt_request(&parameters.request_uri, &parameters.encryption_key)
        .await?;

    request
        .validate()
        .map_err(|error| DecodeError::Invalid(error.to_string()))?;

    tracing::debug!(
        requester = %request.origin_or_client_id,
        requests = request.permission_requests.len(),
        "Decoded out-of-band connection request"
    );
    Ok(request)
}

/// Decode a popup message that already passed the channel's origin, tag
/// and opener checks. The popup's origin becomes the requester identity.
pub fn decode_popup(origin: &str, message: InboundMessage) -> Result<ConnectionRequest, DecodeError> {
    let InboundMessage::AuthorizationRequest { did, permissions } = message;
    let request = ConnectionRequest::new(origin, did, permissions);

    request
        .validate()
        .map_err(|error| DecodeError::Invalid(error.to_string()))?;

    tracing::debug!(
        requester = origin,
        requests = request.permission_requests.len(),
        "Decoded popup connection request"
    );
    Ok(request)
}
