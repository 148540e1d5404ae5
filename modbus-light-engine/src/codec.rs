//! Translation between actuator operations and Modbus requests/responses.

use crate::descriptor::{ActuatorDescriptor, ActuatorKind};
use crate::error::DecodeError;
use crate::transport::{Request, Response};

/// Largest raw value a coil status may carry.
const MAX_COIL_RAW: u16 = 0xFF;

/// Build the read request that polls one actuator.
pub fn encode_read(descriptor: &ActuatorDescriptor) -> Request {
    let slave = descriptor.slave;
    let address = descriptor.read_address();

    match descriptor.kind {
        ActuatorKind::Coil => Request::ReadCoils {
            slave,
            address,
            count: 1,
        },
        ActuatorKind::HoldingRegister { .. } => Request::ReadHoldingRegisters {
            slave,
            address,
            count: 1,
        },
    }
}

/// Interpret a read response as ON (`true`) or OFF (`false`).
///
/// Coils are ON when the least significant bit of the raw value is set.
/// Holding registers are ON only when the raw value equals `command_on`;
/// every other value, including anomalous ones, reads as OFF.
pub fn decode_read(
    descriptor: &ActuatorDescriptor,
    response: &Response,
) -> Result<bool, DecodeError> {
    match (descriptor.kind, response) {
        (ActuatorKind::Coil, Response::Coils(values)) => {
            let raw = single(values)?;
            if raw > MAX_COIL_RAW {
                return Err(DecodeError::OutOfRange(raw));
            }
            Ok(raw & 0x01 == 0x01)
        }
        (ActuatorKind::HoldingRegister { command_on, .. }, Response::Registers(values)) => {
            let raw = single(values)?;
            Ok(raw == command_on)
        }
        (ActuatorKind::Coil, other) => Err(DecodeError::UnexpectedResponse {
            expected: "coils",
            actual: other.kind(),
        }),
        (ActuatorKind::HoldingRegister { .. }, other) => Err(DecodeError::UnexpectedResponse {
            expected: "registers",
            actual: other.kind(),
        }),
    }
}

/// Build the write request that drives an actuator to the desired state.
pub fn encode_write(descriptor: &ActuatorDescriptor, desired_on: bool) -> Request {
    let slave = descriptor.slave;
    let address = descriptor.address;

    match descriptor.kind {
        ActuatorKind::Coil => Request::WriteSingleCoil {
            slave,
            address,
            value: desired_on,
        },
        ActuatorKind::HoldingRegister {
            command_on,
            command_off,
            ..
        } => Request::WriteSingleRegister {
            slave,
            address,
            value: if desired_on { command_on } else { command_off },
        },
    }
}

fn single(values: &[u16]) -> Result<u16, DecodeError> {
    match values {
        [raw] => Ok(*raw),
        _ => Err(DecodeError::Length {
            expected: 1,
            actual: values.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn coil() -> ActuatorDescriptor {
        ActuatorDescriptor::coil("hall", "hub1", 1, 1234, Duration::from_secs(5))
    }

    fn register() -> ActuatorDescriptor {
        ActuatorDescriptor::holding_register(
            "porch",
            "hub1",
            1,
            1234,
            0x01,
            0x00,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_coil_on_iff_lsb_set() {
        let desc = coil();
        for raw in 0..=0xFFu16 {
            let on = decode_read(&desc, &Response::Coils(vec![raw])).unwrap();
            assert_eq!(on, raw & 1 == 1, "raw value 0x{:02X}", raw);
        }
    }

    #[test]
    fn test_coil_observed_values() {
        let desc = coil();
        let cases = [(0x00, false), (0x80, false), (0xFE, false), (0xFF, true), (0x01, true)];
        for (raw, expected) in cases {
            assert_eq!(decode_read(&desc, &Response::Coils(vec![raw])), Ok(expected));
        }
    }

    #[test]
    fn test_coil_out_of_range() {
        assert_eq!(
            decode_read(&coil(), &Response::Coils(vec![0x0101])),
            Err(DecodeError::OutOfRange(0x0101))
        );
    }

    #[test]
    fn test_register_on_iff_command_on() {
        let desc = register();
        let cases = [(0x00, false), (0x80, false), (0xFE, false), (0xFF, false), (0x01, true)];
        for (raw, expected) in cases {
            assert_eq!(decode_read(&desc, &Response::Registers(vec![raw])), Ok(expected));
        }
    }

    #[test]
    fn test_register_custom_commands() {
        let desc = ActuatorDescriptor::holding_register(
            "fan",
            "hub1",
            2,
            7,
            0xAA,
            0x55,
            Duration::from_secs(1),
        );
        assert_eq!(decode_read(&desc, &Response::Registers(vec![0xAA])), Ok(true));
        // command_off and anything else read as OFF
        assert_eq!(decode_read(&desc, &Response::Registers(vec![0x55])), Ok(false));
        assert_eq!(decode_read(&desc, &Response::Registers(vec![0x01])), Ok(false));
    }

    #[test]
    fn test_malformed_length() {
        assert_eq!(
            decode_read(&coil(), &Response::Coils(vec![])),
            Err(DecodeError::Length {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(
            decode_read(&register(), &Response::Registers(vec![1, 0])),
            Err(DecodeError::Length {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn test_wrong_response_kind() {
        assert_eq!(
            decode_read(&coil(), &Response::Registers(vec![1])),
            Err(DecodeError::UnexpectedResponse {
                expected: "coils",
                actual: "registers"
            })
        );
        assert!(decode_read(&register(), &Response::Written).is_err());
    }

    #[test]
    fn test_encode_read() {
        assert_eq!(
            encode_read(&coil()),
            Request::ReadCoils {
                slave: 1,
                address: 1234,
                count: 1
            }
        );
        assert_eq!(
            encode_read(&register().with_verify_address(1300)),
            Request::ReadHoldingRegisters {
                slave: 1,
                address: 1300,
                count: 1
            }
        );
    }

    #[test]
    fn test_encode_write() {
        assert_eq!(
            encode_write(&coil(), true),
            Request::WriteSingleCoil {
                slave: 1,
                address: 1234,
                value: true
            }
        );

        let desc = ActuatorDescriptor::holding_register(
            "fan",
            "hub1",
            2,
            7,
            0xAA,
            0x55,
            Duration::from_secs(1),
        )
        .with_verify_address(8);
        assert_eq!(
            encode_write(&desc, true),
            Request::WriteSingleRegister {
                slave: 2,
                address: 7,
                value: 0xAA
            }
        );
        assert_eq!(
            encode_write(&desc, false),
            Request::WriteSingleRegister {
                slave: 2,
                address: 7,
                value: 0x55
            }
        );
    }
}
