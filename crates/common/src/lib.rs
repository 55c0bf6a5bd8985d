// reposync-common: offline record model and wire types shared by the client and CLI

pub mod path;
pub mod protocol;
pub mod record;
