//! Stateless message validation
//!
//! [`validate`] is a pure function over one message: it checks that every
//! field present is legal for the message's opcode and that every field
//! the opcode requires is present. It keeps no state and is called on
//! both outbound messages (before encoding) and inbound messages (after
//! decoding).

use crate::error::ValidationError;
use crate::message::{CdapMessage, Opcode};

/// Validates opcode/field consistency of a single message.
pub fn validate(message: &CdapMessage) -> Result<(), ValidationError> {
    validate_abs_syntax(message)?;
    validate_endpoints(message)?;
    validate_auth(message)?;
    validate_version(message)?;
    validate_invoke_id(message)?;
    validate_object(message)?;
    validate_filter_scope(message)?;
    validate_result_reason(message)?;
    Ok(())
}

fn validate_abs_syntax(message: &CdapMessage) -> Result<(), ValidationError> {
    match (message.abs_syntax, message.opcode.is_connect_family()) {
        (None, true) => Err(ValidationError::MissingField {
            opcode: message.opcode,
            field: "abs_syntax",
        }),
        (Some(_), false) => Err(ValidationError::IllegalField {
            opcode: message.opcode,
            field: "abs_syntax",
        }),
        _ => Ok(()),
    }
}

fn validate_endpoints(message: &CdapMessage) -> Result<(), ValidationError> {
    for (endpoint, field) in [
        (&message.source, "source"),
        (&message.destination, "destination"),
    ] {
        match endpoint {
            Some(info) => {
                if !message.opcode.is_connect_family() {
                    return Err(ValidationError::IllegalField {
                        opcode: message.opcode,
                        field,
                    });
                }
                // CONNECT must carry full application process naming.
                if message.opcode == Opcode::Connect && info.ap_name.is_empty() {
                    return Err(ValidationError::MissingField {
                        opcode: message.opcode,
                        field,
                    });
                }
            }
            None => {
                if message.opcode == Opcode::Connect {
                    return Err(ValidationError::MissingField {
                        opcode: message.opcode,
                        field,
                    });
                }
            }
        }
    }
    Ok(())
}

fn validate_auth(message: &CdapMessage) -> Result<(), ValidationError> {
    if message.auth.is_some() && !message.opcode.is_connect_family() {
        return Err(ValidationError::IllegalField {
            opcode: message.opcode,
            field: "auth",
        });
    }
    Ok(())
}

fn validate_version(message: &CdapMessage) -> Result<(), ValidationError> {
    if message.version.is_none() && message.opcode.is_connect_family() {
        return Err(ValidationError::MissingField {
            opcode: message.opcode,
            field: "version",
        });
    }
    Ok(())
}

fn validate_invoke_id(message: &CdapMessage) -> Result<(), ValidationError> {
    // CONNECT always expects an answer; RELEASE is the only handshake
    // opcode that may legally go out fire-and-forget.
    let requires_invoke_id = message.opcode.is_connect_family()
        || message.opcode.is_response()
        || message.opcode == Opcode::CancelRead;
    if requires_invoke_id && message.invoke_id == 0 {
        return Err(ValidationError::MissingInvokeId {
            opcode: message.opcode,
        });
    }
    Ok(())
}

fn validate_object(message: &CdapMessage) -> Result<(), ValidationError> {
    if message.obj_class.is_some() != message.obj_name.is_some() {
        return Err(ValidationError::ObjectNamingMismatch {
            opcode: message.opcode,
        });
    }
    if !message.opcode.carries_object() {
        for (present, field) in [
            (message.obj_class.is_some(), "obj_class"),
            (message.obj_name.is_some(), "obj_name"),
            (message.obj_instance.is_some(), "obj_instance"),
        ] {
            if present {
                return Err(ValidationError::IllegalField {
                    opcode: message.opcode,
                    field,
                });
            }
        }
    }
    match (&message.obj_value, message.opcode) {
        (None, Opcode::Write) => Err(ValidationError::MissingField {
            opcode: message.opcode,
            field: "obj_value",
        }),
        (Some(_), opcode) if !opcode.carries_object_value() => {
            Err(ValidationError::IllegalField {
                opcode: message.opcode,
                field: "obj_value",
            })
        }
        _ => Ok(()),
    }
}

fn validate_filter_scope(message: &CdapMessage) -> Result<(), ValidationError> {
    if !message.opcode.is_targeted() {
        if message.filter.is_some() {
            return Err(ValidationError::IllegalField {
                opcode: message.opcode,
                field: "filter",
            });
        }
        if message.scope.is_some() {
            return Err(ValidationError::IllegalField {
                opcode: message.opcode,
                field: "scope",
            });
        }
    }
    Ok(())
}

fn validate_result_reason(message: &CdapMessage) -> Result<(), ValidationError> {
    if message.result_reason.is_some() && !message.opcode.carries_result_reason() {
        return Err(ValidationError::IllegalField {
            opcode: message.opcode,
            field: "result_reason",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{
        ConnectionInfo, EndpointInfo, FilterInfo, MessageFlags, ObjectInfo, ResultInfo,
    };
    use bytes::Bytes;

    fn connection() -> ConnectionInfo {
        ConnectionInfo {
            source: EndpointInfo::named("rina.apps.a"),
            destination: EndpointInfo::named("rina.apps.b"),
            ..Default::default()
        }
    }

    fn object() -> ObjectInfo {
        ObjectInfo {
            class: "Flow".into(),
            name: "/flows/1".into(),
            instance: 4,
            value: Some(Bytes::from_static(b"payload")),
        }
    }

    #[test]
    fn test_constructed_messages_validate() {
        let con = connection();
        let obj = object();
        let res = ResultInfo::ok();
        let filt = FilterInfo {
            filter: Bytes::from_static(b"f"),
            scope: 1,
        };
        let flags = MessageFlags::None;

        let messages = vec![
            CdapMessage::connect_request(&con, 1),
            CdapMessage::connect_response(&con, &res, 1),
            CdapMessage::release_request(flags, 2),
            CdapMessage::release_request(flags, 0),
            CdapMessage::release_response(flags, &res, 2),
            CdapMessage::create_request(flags, &obj, Some(&filt), 3),
            CdapMessage::create_response(flags, &obj, &res, 3),
            CdapMessage::delete_request(flags, &obj, None, 4),
            CdapMessage::delete_response(flags, &obj, &res, 4),
            CdapMessage::read_request(flags, &obj, Some(&filt), 5),
            CdapMessage::read_response(flags, &obj, &res, 5),
            CdapMessage::write_request(flags, &obj, None, 6),
            CdapMessage::write_response(flags, &res, 6),
            CdapMessage::start_request(flags, &obj, None, 7),
            CdapMessage::start_response(flags, None, &res, 7),
            CdapMessage::start_response(flags, Some(&obj), &res, 7),
            CdapMessage::stop_request(flags, &obj, None, 8),
            CdapMessage::stop_response(flags, &res, 8),
            CdapMessage::cancel_read_request(flags, 5),
            CdapMessage::cancel_read_response(flags, &res, 5),
        ];

        for msg in messages {
            assert!(validate(&msg).is_ok(), "expected {} to validate", msg);
        }
    }

    #[test]
    fn test_abs_syntax_rules() {
        let mut msg = CdapMessage::connect_request(&connection(), 1);
        msg.abs_syntax = None;
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::MissingField { field: "abs_syntax", .. })
        ));

        let mut msg = CdapMessage::read_request(MessageFlags::None, &object(), None, 2);
        msg.abs_syntax = Some(0x0073);
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::IllegalField { field: "abs_syntax", .. })
        ));
    }

    #[test]
    fn test_endpoints_only_on_connect_family() {
        let mut msg = CdapMessage::write_response(MessageFlags::None, &ResultInfo::ok(), 2);
        msg.source = Some(EndpointInfo::named("a"));
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::IllegalField { field: "source", .. })
        ));
    }

    #[test]
    fn test_connect_requires_peer_names() {
        let mut con = connection();
        con.destination.ap_name.clear();
        let msg = CdapMessage::connect_request(&con, 1);
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::MissingField { field: "destination", .. })
        ));
    }

    #[test]
    fn test_version_required_for_connect() {
        let mut msg = CdapMessage::connect_request(&connection(), 1);
        msg.version = None;
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::MissingField { field: "version", .. })
        ));
    }

    #[test]
    fn test_responses_need_invoke_id() {
        for msg in [
            CdapMessage::connect_request(&connection(), 0),
            CdapMessage::create_response(MessageFlags::None, &object(), &ResultInfo::ok(), 0),
            CdapMessage::cancel_read_request(MessageFlags::None, 0),
            CdapMessage::cancel_read_response(MessageFlags::None, &ResultInfo::ok(), 0),
        ] {
            assert!(matches!(
                validate(&msg),
                Err(ValidationError::MissingInvokeId { .. })
            ));
        }
    }

    #[test]
    fn test_object_naming_is_mutual() {
        let mut msg = CdapMessage::read_request(MessageFlags::None, &object(), None, 2);
        msg.obj_name = None;
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::ObjectNamingMismatch { .. })
        ));
    }

    #[test]
    fn test_object_value_rules() {
        let mut msg = CdapMessage::write_request(MessageFlags::None, &object(), None, 2);
        msg.obj_value = None;
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::MissingField { field: "obj_value", .. })
        ));

        let mut msg = CdapMessage::release_request(MessageFlags::None, 0);
        msg.obj_value = Some(Bytes::from_static(b"x"));
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::IllegalField { field: "obj_value", .. })
        ));

        let mut msg =
            CdapMessage::delete_response(MessageFlags::None, &object(), &ResultInfo::ok(), 2);
        msg.obj_value = Some(Bytes::from_static(b"x"));
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::IllegalField { field: "obj_value", .. })
        ));
    }

    #[test]
    fn test_scope_and_filter_only_on_targeted() {
        let mut msg = CdapMessage::read_response(
            MessageFlags::None,
            &object(),
            &ResultInfo::ok(),
            2,
        );
        msg.scope = Some(1);
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::IllegalField { field: "scope", .. })
        ));

        msg.scope = None;
        msg.filter = Some(Bytes::from_static(b"f"));
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::IllegalField { field: "filter", .. })
        ));
    }

    #[test]
    fn test_result_reason_only_on_responses_and_cancel() {
        let mut msg = CdapMessage::read_request(MessageFlags::None, &object(), None, 2);
        msg.result_reason = Some("nope".into());
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::IllegalField { field: "result_reason", .. })
        ));

        let msg = CdapMessage::cancel_read_response(
            MessageFlags::None,
            &ResultInfo::failure(1, "cancelled"),
            2,
        );
        assert!(validate(&msg).is_ok());
    }
}
