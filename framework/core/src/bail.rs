/// Return this error from a virtual user's behaviour to indicate that the virtual user is bailing.
///
/// This should be used when a virtual user hits a problem that is fatal to it but not to the
/// scenario. The scheduler treats the slot as free and may start a replacement virtual user on its
/// next tick if the stage table still asks for one.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct VirtualUserBailError {
    msg: String,
}

impl VirtualUserBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for VirtualUserBailError {
    fn default() -> Self {
        Self {
            msg: "Virtual user is bailing".to_string(),
        }
    }
}
