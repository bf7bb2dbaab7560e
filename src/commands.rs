//! 命令注册表：启动时构建一次，之后只读。

use std::collections::HashMap;

use crate::auth::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Login,
    Logout,
    Exec,
    Players,
    CpuUsage,
    RamUsage,
    Tps,
    ReadLogFile,
    FileList,
    FileRead,
    FileWrite,
    FileCreateFolder,
    FileDelete,
    FileRename,
    FileDownload,
}

#[derive(Clone, Copy, Debug)]
pub struct Command {
    pub name: &'static str,
    pub required: Role,
    pub kind: CommandKind,
}

#[derive(Debug)]
pub struct CommandRegistry {
    commands: HashMap<&'static str, Command>,
}

impl CommandRegistry {
    /// `log_viewer_role` 决定 READLOGFILE 所需的最低权限。
    pub fn new(log_viewer_role: Role) -> Self {
        let table = [
            ("LOGIN", Role::Guest, CommandKind::Login),
            ("LOGOUT", Role::Guest, CommandKind::Logout),
            ("EXEC", Role::Admin, CommandKind::Exec),
            ("PLAYERS", Role::User, CommandKind::Players),
            ("CPUUSAGE", Role::User, CommandKind::CpuUsage),
            ("RAMUSAGE", Role::User, CommandKind::RamUsage),
            ("TPS", Role::User, CommandKind::Tps),
            ("READLOGFILE", log_viewer_role, CommandKind::ReadLogFile),
            ("FILE_LIST", Role::Admin, CommandKind::FileList),
            ("FILE_READ", Role::Admin, CommandKind::FileRead),
            ("FILE_WRITE", Role::Admin, CommandKind::FileWrite),
            ("FILE_CREATE_FOLDER", Role::Admin, CommandKind::FileCreateFolder),
            ("FILE_DELETE", Role::Admin, CommandKind::FileDelete),
            ("FILE_RENAME", Role::Admin, CommandKind::FileRename),
            ("FILE_DOWNLOAD", Role::Admin, CommandKind::FileDownload),
        ];

        let commands = table
            .into_iter()
            .map(|(name, required, kind)| {
                (
                    name,
                    Command {
                        name,
                        required,
                        kind,
                    },
                )
            })
            .collect();
        Self { commands }
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
}
