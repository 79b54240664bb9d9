//! Conversion jobs and output path resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gps2shp_ogr::shapefile_family;
use gps2shp_records::InputFile;
use gps2shp_shared::{Gps2ShpError, OutputFormat};

/// Output paths for one input. Only requested targets are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destinations {
    pub markup: Option<PathBuf>,
    pub shapefile: Option<PathBuf>,
}

impl Destinations {
    /// `<dir>/<stem>.kml` and `<dir>/<stem>.shp`, where `dir` is `out_dir`
    /// or the input's own directory.
    pub fn resolve(input: &Path, format: OutputFormat, out_dir: Option<&Path>) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "gps".into());
        let dir = out_dir
            .map(Path::to_path_buf)
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        // Append rather than `with_extension`, which would eat a dotted stem.
        let named = |ext: &str| {
            let mut name = stem.clone();
            name.push(".");
            name.push(ext);
            dir.join(name)
        };

        Self {
            markup: format.wants_markup().then(|| named("kml")),
            shapefile: format.wants_shapefile().then(|| named("shp")),
        }
    }

    /// Every file a conversion may create or replace.
    pub fn all_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.markup.iter().cloned().collect();
        if let Some(shp) = &self.shapefile {
            files.extend(shapefile_family(shp));
        }
        files
    }

    /// Requested primary outputs (`.kml` and/or `.shp`).
    pub fn outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.markup.iter().chain(self.shapefile.iter())
    }
}

/// One validated input and where its outputs go. Consumed once by emit.
#[derive(Debug)]
pub struct ConversionJob {
    pub input: InputFile,
    pub destinations: Destinations,
}

/// Refuse destinations claimed twice in one batch, or that would replace
/// one of the inputs.
pub fn find_collisions<'a, I>(inputs: &[PathBuf], planned: I) -> Vec<Gps2ShpError>
where
    I: IntoIterator<Item = (&'a Path, &'a Destinations)>,
{
    let mut claimed: HashMap<PathBuf, String> = inputs
        .iter()
        .map(|p| (p.clone(), format!("input file {}", p.display())))
        .collect();
    let mut errors = Vec::new();

    for (input, destinations) in planned {
        for path in destinations.all_files() {
            match claimed.get(&path) {
                Some(owner) => errors.push(Gps2ShpError::unwritable(
                    &path,
                    format!("also claimed by {owner}"),
                )),
                None => {
                    claimed.insert(path, format!("output of {}", input.display()));
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_sit_next_to_input_by_default() {
        let d = Destinations::resolve(Path::new("/data/day1.csv"), OutputFormat::Both, None);
        assert_eq!(d.markup, Some(PathBuf::from("/data/day1.kml")));
        assert_eq!(d.shapefile, Some(PathBuf::from("/data/day1.shp")));
    }

    #[test]
    fn out_dir_and_format_are_honoured() {
        let d = Destinations::resolve(
            Path::new("/data/day1.csv"),
            OutputFormat::Shp,
            Some(Path::new("/out")),
        );
        assert_eq!(d.markup, None);
        assert_eq!(d.shapefile, Some(PathBuf::from("/out/day1.shp")));
        assert_eq!(d.all_files().len(), 4);
    }

    #[test]
    fn relative_input_without_directory() {
        let d = Destinations::resolve(Path::new("track.txt"), OutputFormat::Kml, None);
        assert_eq!(d.markup, Some(PathBuf::from("track.kml")));
        assert_eq!(d.outputs().count(), 1);
    }

    #[test]
    fn dotted_stems_keep_every_part() {
        let d = Destinations::resolve(Path::new("/data/day.1.csv"), OutputFormat::Both, None);
        assert_eq!(d.markup, Some(PathBuf::from("/data/day.1.kml")));
        assert_eq!(d.shapefile, Some(PathBuf::from("/data/day.1.shp")));
        assert!(d.all_files().contains(&PathBuf::from("/data/day.1.dbf")));

        let inputs = vec![
            PathBuf::from("/data/track.a.csv"),
            PathBuf::from("/data/track.b.csv"),
        ];
        let d1 = Destinations::resolve(&inputs[0], OutputFormat::Both, None);
        let d2 = Destinations::resolve(&inputs[1], OutputFormat::Both, None);
        let errors = find_collisions(
            &inputs,
            [(inputs[0].as_path(), &d1), (inputs[1].as_path(), &d2)],
        );
        assert!(errors.is_empty(), "unexpected collisions: {errors:?}");
    }

    #[test]
    fn same_stem_in_one_out_dir_collides() {
        let inputs = vec![PathBuf::from("/a/track.csv"), PathBuf::from("/b/track.csv")];
        let out = Some(Path::new("/out"));
        let d1 = Destinations::resolve(&inputs[0], OutputFormat::Kml, out);
        let d2 = Destinations::resolve(&inputs[1], OutputFormat::Kml, out);

        let errors = find_collisions(
            &inputs,
            [(inputs[0].as_path(), &d1), (inputs[1].as_path(), &d2)],
        );
        assert_eq!(errors.len(), 1);
        let msg = errors[0].to_string();
        assert!(msg.contains("/out/track.kml"));
        assert!(msg.contains("also claimed by output of /a/track.csv"));
    }

    #[test]
    fn output_replacing_an_input_is_refused() {
        let inputs = vec![PathBuf::from("/data/route.kml")];
        let d = Destinations::resolve(&inputs[0], OutputFormat::Kml, None);
        let errors = find_collisions(&inputs, [(inputs[0].as_path(), &d)]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("input file"));
    }
}
