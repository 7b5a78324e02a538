use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub(crate) struct Args {
    /// Server listening host
    #[arg(long, env = "VFS_HOST", default_value = "127.0.0.1")]
    pub(crate) host: String,

    /// Server listening port
    #[arg(short, long, env = "VFS_PORT", default_value_t = 8000)]
    pub(crate) port: u16,

    /// Directory backing the `{vfs}` segment token
    #[arg(long, env = "VFS_ROOTDIR", default_value = "/var/lib/deskvfs")]
    pub(crate) root: String,

    /// Path to the JSON configuration file (mountpoints, MIME table)
    #[arg(short, long, env = "VFS_CONFIG")]
    pub(crate) config: Option<String>,
}
