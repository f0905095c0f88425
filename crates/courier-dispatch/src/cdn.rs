//! Signed upload forms and the multipart bodies posted to the CDN.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pre-signed POST policy issued by the service for one CDN object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadForm {
    /// Object key on the CDN.
    pub key: String,
    /// Signing credential scope.
    pub credential: String,
    /// Canned ACL.
    pub acl: String,
    /// Signature algorithm.
    pub algorithm: String,
    /// Signing date.
    pub date: String,
    /// Base64 POST policy.
    pub policy: String,
    /// Policy signature.
    pub signature: String,
}

/// Upload form for a single attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUploadForm {
    /// Signed form for the attachment object.
    #[serde(flatten)]
    pub form: UploadForm,
    /// Server-assigned attachment id.
    pub attachment_id_string: String,
}

/// Forms for a pack: one for the manifest and one per part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackUploadForms {
    /// Server-assigned pack id.
    pub pack_id: String,
    /// Form for the manifest.
    pub manifest: UploadForm,
    /// One form per part, in upload order.
    pub stickers: Vec<UploadForm>,
}

/// A ready-to-send multipart body.
#[derive(Debug, Clone)]
pub struct PutParams {
    /// Encoded multipart body.
    pub body: Bytes,
    /// `multipart/form-data; boundary=...`
    pub content_type: String,
    /// Exact body length in bytes.
    pub content_length: usize,
}

/// Builds the `multipart/form-data` body uploading `data` under `form`.
pub fn make_put_params(form: &UploadForm, data: &[u8]) -> PutParams {
    let boundary = format!("----------------{}", Uuid::new_v4().simple());
    let fields = [
        ("key", form.key.as_str()),
        ("x-amz-credential", form.credential.as_str()),
        ("acl", form.acl.as_str()),
        ("x-amz-algorithm", form.algorithm.as_str()),
        ("x-amz-date", form.date.as_str()),
        ("policy", form.policy.as_str()),
        ("x-amz-signature", form.signature.as_str()),
        ("Content-Type", "application/octet-stream"),
    ];

    let mut body = BytesMut::with_capacity(data.len() + 1024);
    for (name, value) in fields {
        body.put_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.put_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.put_slice(data);
    body.put_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let body = body.freeze();
    PutParams {
        content_length: body.len(),
        content_type: format!("multipart/form-data; boundary={boundary}"),
        body,
    }
}
