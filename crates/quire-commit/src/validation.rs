//! Structural checks run before any I/O.

use quire_types::{Author, BufferEncoding};

use crate::error::{CommitError, CommitResult};
use crate::request::CommitRequest;

/// Check author and message.
pub fn validate_authoring(author: &Author, message: &str) -> CommitResult<()> {
    if !author.is_complete() {
        return Err(CommitError::MissingAuthor);
    }
    if message.trim().is_empty() {
        return Err(CommitError::MissingCommitMessage);
    }
    Ok(())
}

/// Check a commit request: non-empty changeset, author, message, and the
/// declared encoding of every change.
pub fn validate_request(request: &CommitRequest) -> CommitResult<()> {
    if request.changeset.is_empty() {
        return Err(CommitError::EmptyChangeset);
    }
    validate_authoring(&request.author, &request.message)?;

    for (path, change) in &request.changeset {
        let Some(declared) = change.encoding.as_deref() else {
            continue;
        };
        let encoding: BufferEncoding =
            declared
                .parse()
                .map_err(|_| CommitError::UnsupportedEncoding {
                    path: path.clone(),
                    encoding: declared.to_string(),
                })?;
        if encoding == BufferEncoding::Utf8 {
            if let Some(content) = &change.new_value {
                if std::str::from_utf8(content).is_err() {
                    return Err(CommitError::InvalidUtf8(path.clone()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use quire_types::{BufferChange, BufferChangeset, BufferPath};

    fn author() -> Author {
        Author::new("Ada", "ada@example.org")
    }

    fn request(changeset: BufferChangeset) -> CommitRequest {
        CommitRequest::new(author(), "update", changeset)
    }

    fn single(change: BufferChange) -> BufferChangeset {
        let mut changeset = BufferChangeset::new();
        changeset.insert(BufferPath::new("a.txt").unwrap(), change);
        changeset
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate_request(&request(single(BufferChange::create("x")))).is_ok());
    }

    #[test]
    fn empty_changeset_is_rejected() {
        assert!(matches!(
            validate_request(&request(BufferChangeset::new())),
            Err(CommitError::EmptyChangeset)
        ));
    }

    #[test]
    fn blank_author_is_rejected() {
        let mut req = request(single(BufferChange::create("x")));
        req.author = Author::new("", "ada@example.org");
        assert!(matches!(validate_request(&req), Err(CommitError::MissingAuthor)));
    }

    #[test]
    fn blank_message_is_rejected() {
        let mut req = request(single(BufferChange::create("x")));
        req.message = "   ".into();
        assert!(matches!(
            validate_request(&req),
            Err(CommitError::MissingCommitMessage)
        ));
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let req = request(single(BufferChange::create("x").with_encoding("utf-16")));
        assert!(matches!(
            validate_request(&req),
            Err(CommitError::UnsupportedEncoding { encoding, .. }) if encoding == "utf-16"
        ));
    }

    #[test]
    fn utf8_encoding_requires_valid_text() {
        let bad = BufferChange::create(Bytes::from_static(&[0xff, 0x00])).with_encoding("utf-8");
        assert!(matches!(
            validate_request(&request(single(bad))),
            Err(CommitError::InvalidUtf8(_))
        ));
        let binary = BufferChange::create(Bytes::from_static(&[0xff, 0x00])).with_encoding("binary");
        assert!(validate_request(&request(single(binary))).is_ok());
    }
}
