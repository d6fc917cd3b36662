//! Checks for Mono and .NET Framework XML configuration files.
//!
//! Both runtimes accept configuration files rooted at `<configuration>`, and both are quiet
//! about files they cannot parse: Mono skips them, the .NET Framework fails much later with an
//! unrelated error. Checking the file up front turns that into a
//! [`crate::Error::RuntimeInitialization`] naming the file.

use std::path::Path;

use quick_xml::{events::Event, Reader};

use crate::{backend::BackendKind, Result};

/// What the loader extracts from a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlConfigSummary {
    /// `version` attributes of `configuration/startup/supportedRuntime`, in file order
    pub supported_runtimes: Vec<String>,
}

/// Verifies that `path` is a well-formed configuration file rooted at `<configuration>`.
///
/// # Errors
///
/// Returns [`crate::Error::RuntimeInitialization`] for `backend` if the file cannot be read,
/// is not well-formed XML or has a different root element.
pub fn check_config_file(path: &Path, backend: BackendKind) -> Result<XmlConfigSummary> {
    let mut reader = Reader::from_file(path).map_err(|e| {
        init_error!(
            backend,
            "cannot read configuration file '{}': {}",
            path.display(),
            e
        )
    })?;

    let invalid = |reason: String| {
        init_error!(
            backend,
            "'{}' is not a valid configuration file: {}",
            path.display(),
            reason
        )
    };

    let mut summary = XmlConfigSummary::default();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) | Ok(Event::Empty(element))
                if !seen_root && element.name().as_ref() != b"configuration" =>
            {
                return Err(invalid(format!(
                    "root element is <{}>, expected <configuration>",
                    String::from_utf8_lossy(element.name().as_ref())
                )));
            }
            Ok(Event::Start(element)) => {
                seen_root = true;
                stack.push(element.name().as_ref().to_vec());
            }
            Ok(Event::Empty(element)) => {
                seen_root = true;
                let in_startup = stack.len() == 2 && stack[1] == b"startup";
                if in_startup && element.name().as_ref() == b"supportedRuntime" {
                    let version = element
                        .try_get_attribute("version")
                        .map_err(|e| invalid(e.to_string()))?;
                    if let Some(version) = version {
                        summary
                            .supported_runtimes
                            .push(String::from_utf8_lossy(&version.value).into_owned());
                    }
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(invalid(e.to_string())),
        }
        buf.clear();
    }

    if !seen_root {
        return Err(invalid("no root element".to_string()));
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn write(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.config");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn app_config_with_startup() {
        let (_dir, path) = write(
            r#"<?xml version="1.0" encoding="utf-8"?>
            <configuration>
              <startup useLegacyV2RuntimeActivationPolicy="true">
                <supportedRuntime version="v4.0" sku=".NETFramework,Version=v4.8"/>
                <supportedRuntime version="v2.0.50727"/>
              </startup>
            </configuration>"#,
        );

        let summary = check_config_file(&path, BackendKind::NetFx).unwrap();
        assert_eq!(summary.supported_runtimes, vec!["v4.0", "v2.0.50727"]);
    }

    #[test]
    fn mono_config_without_startup() {
        let (_dir, path) = write(
            r#"<configuration>
                <dllmap dll="i:cygwin1.dll" target="libc.so.6" os="!windows"/>
            </configuration>"#,
        );

        let summary = check_config_file(&path, BackendKind::Mono).unwrap();
        assert!(summary.supported_runtimes.is_empty());
    }

    #[test]
    fn wrong_root_element() {
        let (_dir, path) = write("<settings><a/></settings>");

        match check_config_file(&path, BackendKind::Mono) {
            Err(Error::RuntimeInitialization { backend, message }) => {
                assert_eq!(backend, BackendKind::Mono);
                assert!(message.contains("<settings>"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn mismatched_tags() {
        let (_dir, path) = write("<configuration><startup></configuration>");
        assert!(matches!(
            check_config_file(&path, BackendKind::NetFx),
            Err(Error::RuntimeInitialization { .. })
        ));
    }

    #[test]
    fn empty_and_missing_files() {
        let (_dir, path) = write("");
        assert!(check_config_file(&path, BackendKind::Mono).is_err());

        assert!(check_config_file(Path::new("/nonexistent/app.config"), BackendKind::Mono).is_err());
    }
}
