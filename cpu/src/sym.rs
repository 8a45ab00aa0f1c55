// SPDX-License-Identifier: MPL-2.0

//! Names for BIOS entry points, used in logs.

/// The name of the kernel service requested by `syscall`, given the function number in `a0`.
pub fn for_syscall(function: u32) -> &'static str {
    match function {
        0 => "NoFunction",
        1 => "EnterCriticalSection",
        2 => "ExitCriticalSection",
        3 => "ChangeThreadSubFunction",
        _ => "DeliverEvent",
    }
}

/// The name of the PC file-server call requested by `break`, given the break code.
pub fn for_break(code: u32) -> Option<&'static str> {
    let name = match code {
        0x101 => "PCInit",
        0x102 => "PCCreate",
        0x103 => "PCOpen",
        0x104 => "PCClose",
        0x105 => "PCRead",
        0x106 => "PCWrite",
        0x107 => "PClSeek",
        _ => return None,
    };

    Some(name)
}
