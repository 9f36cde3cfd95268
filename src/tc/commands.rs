// The five tc commands of one shaping sequence, and the clear step's benign failure.

use crate::command::{CommandOutput, ShellCommand};
use crate::error::TcStep;
use crate::models::Policy;

/// Root HTB qdisc handle.
pub const ROOT_HANDLE: &str = "1a1a:";
/// The single rate-limited class; also the root's default class.
pub const CLASS_ID: &str = "1a1a:1";
/// SFQ qdisc attached under the class.
pub const SFQ_HANDLE: &str = "2a2a:";

/// Output of `tc qdisc del dev <if> root` when there is no root qdisc to delete.
///
/// Compared exactly after trimming. iproute2 builds without extended ack print the first;
/// current builds print the second. tc exits 2 for every netlink error, so the text is the only
/// distinguishing signal.
pub const MISSING_ROOT_QDISC_DIAGNOSTICS: &[&str] = &[
    "RTNETLINK answers: No such file or directory",
    "Error: Cannot delete qdisc with handle of zero.",
];

/// The clear-step failure that means "nothing to clear".
pub fn is_missing_root_qdisc(out: &CommandOutput) -> bool {
    out.status.is_some_and(|s| s != 0)
        && MISSING_ROOT_QDISC_DIAGNOSTICS.contains(&out.output.trim())
}

/// clear, create-root, create-class, create-fair-queue, create-filter, in order.
pub fn shaping_steps(tc: &str, interface: &str, policy: &Policy) -> [(TcStep, ShellCommand); 5] {
    let rate = policy.rate.as_str();
    let ceil = policy.ceil.as_str();
    [
        (
            TcStep::Clear,
            ShellCommand::new(tc, ["qdisc", "del", "dev", interface, "root"]),
        ),
        (
            TcStep::CreateRoot,
            ShellCommand::new(
                tc,
                ["qdisc", "add", "dev", interface, "root", "handle", ROOT_HANDLE, "htb", "default", "1"],
            ),
        ),
        (
            TcStep::CreateClass,
            ShellCommand::new(
                tc,
                [
                    "class", "add", "dev", interface, "parent", ROOT_HANDLE, "classid", CLASS_ID,
                    "htb", "rate", rate, "ceil", ceil,
                ],
            ),
        ),
        (
            TcStep::CreateFairQueue,
            ShellCommand::new(
                tc,
                [
                    "qdisc", "add", "dev", interface, "parent", CLASS_ID, "handle", SFQ_HANDLE,
                    "sfq", "perturb", "10",
                ],
            ),
        ),
        (
            TcStep::CreateFilter,
            ShellCommand::new(
                tc,
                [
                    "filter", "add", "dev", interface, "parent", ROOT_HANDLE, "protocol", "ip",
                    "prio", "1", "u32", "match", "ip", "src", "0.0.0.0/0", "match", "ip", "dst",
                    "0.0.0.0/0", "flowid", CLASS_ID,
                ],
            ),
        ),
    ]
}
