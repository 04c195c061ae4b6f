// OTA (Over-The-Air) update module

pub mod device;
pub mod firmware;
pub mod invite;
pub mod status;
pub mod updater;

pub use device::DeviceAddress;
pub use firmware::FirmwareImage;
pub use invite::{InviteFormat, InviteRequest, InviteStrategy, JsonPostInvite, QueryGetInvite};
pub use status::{OtaStatus, StatusPoller, StatusReport};
pub use updater::{exit_code, OtaOutcome, OtaUpdater};

// OTA update flow:
// 1. Hash the firmware image (MD5)
// 2. Serve its directory on an ephemeral port
// 3. Invite the device to pull the image
// 4. Poll the device until it reports success, failure or the deadline passes
// 5. Shut the file server down
