use {
    crate::args::ClapArgumentLoader,
    anyhow::Result,
    std::{fs::File, io::Write, path::Path},
};

pub(crate) fn build_shell_completion(outdir: &Path, shell: &clap_complete::Shell) -> Result<()> {
    let mut app = ClapArgumentLoader::root_command();
    clap_complete::generate_to(*shell, &mut app, "pqmigrate", outdir)?;
    Ok(())
}

/// One page per command, recursing into subcommands (`pqmigrate-apply-up.1`).
pub(crate) fn build_manpages(outdir: &Path) -> Result<()> {
    fn render(outdir: &Path, app: &clap::Command, prefix: &str) -> Result<()> {
        let name = if prefix.is_empty() {
            app.get_name().to_string()
        } else {
            format!("{}-{}", prefix, app.get_name())
        };
        let mut file = File::create(outdir.join(format!("{}.1", name)))?;
        clap_mangen::Man::new(app.clone()).render(&mut file)?;
        for sub in app.get_subcommands() {
            render(outdir, sub, &name)?;
        }
        Ok(())
    }

    let mut app = ClapArgumentLoader::root_command();
    app.build();
    render(outdir, &app, "")
}

pub(crate) fn build_markdown(outdir: &Path) -> Result<()> {
    let app = ClapArgumentLoader::root_command();
    let mut file = File::create(outdir.join("pqmigrate.md"))?;
    file.write_all(clap_markdown::help_markdown_command(&app).as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manpages_cover_subcommands() {
        let dir = tempfile::TempDir::new().unwrap();
        build_manpages(dir.path()).unwrap();
        assert!(dir.path().join("pqmigrate.1").is_file());
        assert!(dir.path().join("pqmigrate-sync.1").is_file());
        assert!(dir.path().join("pqmigrate-apply-down.1").is_file());
    }

    #[test]
    fn test_markdown() {
        let dir = tempfile::TempDir::new().unwrap();
        build_markdown(dir.path()).unwrap();
        let text = std::fs::read_to_string(dir.path().join("pqmigrate.md")).unwrap();
        assert!(text.contains("unsquash"));
    }
}
