// Interactive setup
//
// Walks the user through choosing or building a compression profile and the
// job options, then hands back a plan that the caller turns into a job.
// Prompts go through the `Prompter` trait so the flow can be scripted.

use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{CompressifyError, Result};
use crate::job::{format_file_size, JobOptions};
use crate::media::{discover_files, KindFilter, MediaKind};
use crate::profile::manager::validate_profile_name;
use crate::profile::{
    builtin_profile_names, CompressionProfile, ImageFormat, ImageSettings, ProfileManager,
    QualityLevel, VideoFormat, VideoResolution, VideoSettings,
};

const MAX_IMAGE_DIMENSION: u32 = 16384;

/// Source of answers for the wizard
pub trait Prompter {
    /// Index of the chosen item
    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize>;
    fn input(&self, prompt: &str, default: &str) -> Result<String>;
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
    /// Informational line shown between prompts
    fn note(&self, message: &str);
}

/// Terminal prompts
pub struct DialoguerPrompter {
    theme: ColorfulTheme,
}

impl Default for DialoguerPrompter {
    fn default() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Prompter for DialoguerPrompter {
    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize> {
        Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()
            .map_err(prompt_error)
    }

    fn input(&self, prompt: &str, default: &str) -> Result<String> {
        let mut input = Input::<String>::with_theme(&self.theme).with_prompt(prompt);
        if !default.is_empty() {
            input = input.default(default.to_string());
        }
        input.interact_text().map_err(prompt_error)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(prompt_error)
    }

    fn note(&self, message: &str) {
        println!("{}", message);
    }
}

fn prompt_error(e: dialoguer::Error) -> CompressifyError {
    CompressifyError::Prompt(e.to_string())
}

/// Everything needed to create and run a job
#[derive(Debug, Clone, PartialEq)]
pub struct WizardPlan {
    pub profile: CompressionProfile,
    pub options: JobOptions,
    pub workers: usize,
}

pub struct Wizard<P: Prompter> {
    prompter: P,
}

impl<P: Prompter> Wizard<P> {
    pub fn new(prompter: P) -> Self {
        Self { prompter }
    }

    /// Ask for the settings of a job over `input`. Returns `None` when the
    /// user declines to start.
    pub fn run(&self, input: &Path, profiles: &ProfileManager) -> Result<Option<WizardPlan>> {
        let files = discover_files(input, KindFilter::All)?;
        if files.is_empty() {
            return Err(CompressifyError::InvalidInput(format!(
                "No supported media files found in {}",
                input.display()
            )));
        }

        let (mut videos, mut images) = (0usize, 0usize);
        let (mut video_bytes, mut image_bytes) = (0u64, 0u64);
        for file in &files {
            match file.kind {
                MediaKind::Video => {
                    videos += 1;
                    video_bytes += file.size;
                }
                MediaKind::Image => {
                    images += 1;
                    image_bytes += file.size;
                }
            }
        }
        self.prompter.note(&format!(
            "Found {} videos ({}) and {} images ({}) in {}",
            videos,
            format_file_size(video_bytes),
            images,
            format_file_size(image_bytes),
            input.display()
        ));

        let detected = match (videos > 0, images > 0) {
            (true, false) => KindFilter::Video,
            (false, true) => KindFilter::Image,
            _ => KindFilter::All,
        };

        let method = self.prompter.select(
            "How would you like to configure compression?",
            &labels(&["Use a saved or built-in profile", "Create custom settings", "Quick setup (recommended)"]),
            2,
        )?;

        let (profile, kind_filter, offer_save) = match method {
            0 => {
                let (profile, modified) = self.choose_profile(profiles, detected)?;
                (profile, detected, modified)
            }
            1 => {
                let kind_filter = if detected == KindFilter::All {
                    self.ask_kinds("Which files would you like to process?")?
                } else {
                    detected
                };
                let mut profile = CompressionProfile {
                    name: "custom".to_string(),
                    description: "Custom settings for this job".to_string(),
                    video: VideoSettings::default(),
                    image: ImageSettings::default(),
                    created_at: None,
                };
                if kind_filter.accepts(MediaKind::Video) {
                    profile.video = self.ask_video()?;
                }
                if kind_filter.accepts(MediaKind::Image) {
                    profile.image = self.ask_image()?;
                }
                (profile, kind_filter, true)
            }
            _ => (self.quick_profile()?, detected, true),
        };

        let workers = self.ask_number(
            &format!("Files to compress in parallel (1-{})", max_workers()),
            "1",
            1..=max_workers() as u32,
        )? as usize;
        let overwrite = self
            .prompter
            .confirm("Overwrite existing output files instead of skipping them?", false)?;
        let keep_record = self
            .prompter
            .confirm("Keep the job record after a clean run?", false)?;

        let mut profile = profile;
        if offer_save && self.prompter.confirm("Save these settings as a profile?", false)? {
            self.save_as(&mut profile, profiles)?;
        }

        // Catch bad values before asking to start
        profile.resolve()?;

        let selected = files.iter().filter(|f| kind_filter.accepts(f.kind)).count();
        if !self
            .prompter
            .confirm(&format!("Start compressing {} files with '{}'?", selected, profile.name), true)?
        {
            info!("Interactive setup cancelled");
            return Ok(None);
        }

        debug!("Interactive plan: profile '{}', {} workers", profile.name, workers);
        Ok(Some(WizardPlan {
            profile,
            options: JobOptions {
                kind_filter,
                overwrite,
                keep_record,
            },
            workers,
        }))
    }

    /// Build a new profile named `name` from prompts. The caller saves it.
    pub fn create_profile(&self, name: &str) -> Result<CompressionProfile> {
        validate_profile_name(name)?;
        self.prompter.note(&format!("Creating profile '{}'", name));

        let description = self.prompter.input("Description (optional)", "")?;
        let kinds = self.ask_kinds("Which files should this profile handle?")?;

        let mut profile = CompressionProfile {
            name: name.to_string(),
            description: description.trim().to_string(),
            video: VideoSettings::default(),
            image: ImageSettings::default(),
            created_at: None,
        };
        if kinds.accepts(MediaKind::Video) {
            profile.video = self.ask_video()?;
        }
        if kinds.accepts(MediaKind::Image) {
            profile.image = self.ask_image()?;
        }
        Ok(profile)
    }

    fn choose_profile(&self, profiles: &ProfileManager, detected: KindFilter) -> Result<(CompressionProfile, bool)> {
        let mut names: Vec<String> = builtin_profile_names().iter().map(|n| n.to_string()).collect();
        names.extend(profiles.list_custom_profiles()?);

        let items: Vec<String> = names
            .iter()
            .map(|name| match profiles.load_profile(name) {
                Ok(profile) if !profile.description.is_empty() => format!("{} - {}", name, profile.description),
                _ => name.clone(),
            })
            .collect();
        let default = names.iter().position(|n| n == "medium").unwrap_or(0);
        let index = self.prompter.select("Choose a compression profile", &items, default)?;
        let mut profile = profiles.load_profile(&names[index])?;

        if !self.prompter.confirm("Would you like to modify any settings?", false)? {
            return Ok((profile, false));
        }
        let mut modified = false;
        if detected.accepts(MediaKind::Video) && self.prompter.confirm("Change video settings?", true)? {
            profile.video = self.ask_video()?;
            modified = true;
        }
        if detected.accepts(MediaKind::Image) && self.prompter.confirm("Change image settings?", true)? {
            profile.image = self.ask_image()?;
            modified = true;
        }
        if modified {
            profile.name = format!("{}-modified", profile.name);
            profile.created_at = None;
        }
        Ok((profile, modified))
    }

    fn quick_profile(&self) -> Result<CompressionProfile> {
        let levels = [QualityLevel::High, QualityLevel::Medium, QualityLevel::Low];
        let index = self.prompter.select(
            "Choose overall quality level",
            &labels(&[
                "High (larger files, better quality)",
                "Medium (balanced)",
                "Low (smaller files, lower quality)",
            ]),
            1,
        )?;
        let level = levels[index];
        let tag = level_name(level);

        Ok(CompressionProfile {
            name: format!("quick-{}", tag),
            description: format!("Quick setup for {} quality", tag),
            video: VideoSettings {
                quality_level: level,
                ..VideoSettings::default()
            },
            image: ImageSettings {
                format: ImageFormat::Webp,
                quality_level: level,
                ..ImageSettings::default()
            },
            created_at: None,
        })
    }

    fn ask_kinds(&self, prompt: &str) -> Result<KindFilter> {
        let kinds = [KindFilter::All, KindFilter::Video, KindFilter::Image];
        let index = self
            .prompter
            .select(prompt, &labels(&["Videos and images", "Videos only", "Images only"]), 0)?;
        Ok(kinds[index])
    }

    fn ask_video(&self) -> Result<VideoSettings> {
        self.prompter.note("Video settings");

        let formats: Vec<String> = VideoFormat::ALL
            .iter()
            .map(|f| f.extension().to_uppercase())
            .collect();
        let format = VideoFormat::ALL[self.prompter.select("Output video format", &formats, 0)?];

        let resolutions: Vec<String> = VideoResolution::ALL.iter().map(resolution_label).collect();
        let resolution = VideoResolution::ALL[self.prompter.select("Target resolution", &resolutions, 0)?];

        let advanced = self.prompter.select(
            "Quality control",
            &labels(&["Simple (low/medium/high)", "Advanced (CRF value)"]),
            0,
        )? == 1;

        let mut settings = VideoSettings {
            format,
            resolution,
            ..VideoSettings::default()
        };
        if advanced {
            settings.crf = Some(self.ask_number("CRF value (0-51, lower = better quality)", "23", 0..=51)? as u8);
        } else {
            settings.quality_level = self.ask_level("Video quality level")?;
        }

        let (codec, audio_codec) = codecs_for(format);
        settings.codec = codec.to_string();
        settings.audio_codec = audio_codec.to_string();
        Ok(settings)
    }

    fn ask_image(&self) -> Result<ImageSettings> {
        self.prompter.note("Image settings");

        let formats: Vec<String> = ImageFormat::ALL
            .iter()
            .map(|f| f.extension().to_uppercase())
            .collect();
        let webp = ImageFormat::ALL
            .iter()
            .position(|f| *f == ImageFormat::Webp)
            .unwrap_or(0);
        let format = ImageFormat::ALL[self.prompter.select("Output image format", &formats, webp)?];

        let quality = self.ask_number("Quality (1-100, higher = better)", "85", 1..=100)? as u8;
        let lossless = matches!(format, ImageFormat::Webp | ImageFormat::Avif)
            && self.prompter.confirm("Use lossless encoding?", false)?;

        let (mut width, mut height) = (None, None);
        if self.prompter.confirm("Resize images?", false)? {
            let range = 0..=MAX_IMAGE_DIMENSION;
            width = Some(self.ask_number("Target width in pixels (0 keeps the aspect ratio)", "0", range.clone())?)
                .filter(|w| *w > 0);
            height = Some(self.ask_number("Target height in pixels (0 keeps the aspect ratio)", "0", range)?)
                .filter(|h| *h > 0);
        }

        Ok(ImageSettings {
            format,
            width,
            height,
            quality: Some(quality),
            lossless,
            ..ImageSettings::default()
        })
    }

    fn ask_level(&self, prompt: &str) -> Result<QualityLevel> {
        let levels = [QualityLevel::High, QualityLevel::Medium, QualityLevel::Low];
        let index = self.prompter.select(
            prompt,
            &labels(&["High (best quality)", "Medium (balanced)", "Low (smaller files)"]),
            1,
        )?;
        Ok(levels[index])
    }

    /// Re-asks until the answer is a whole number in `range`
    fn ask_number(&self, prompt: &str, default: &str, range: RangeInclusive<u32>) -> Result<u32> {
        loop {
            let answer = self.prompter.input(prompt, default)?;
            match answer.trim().parse::<u32>() {
                Ok(value) if range.contains(&value) => return Ok(value),
                _ => self.prompter.note(&format!(
                    "Enter a whole number from {} to {}",
                    range.start(),
                    range.end()
                )),
            }
        }
    }

    fn save_as(&self, profile: &mut CompressionProfile, profiles: &ProfileManager) -> Result<()> {
        loop {
            let name = self.prompter.input("Profile name", "")?;
            let name = name.trim();
            if let Err(e) = validate_profile_name(name) {
                self.prompter.note(&e.to_string());
                continue;
            }
            profile.name = name.to_string();
            let path = profiles.save_profile(profile)?;
            self.prompter
                .note(&format!("Saved profile '{}' to {}", profile.name, path.display()));
            return Ok(());
        }
    }
}

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn max_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn level_name(level: QualityLevel) -> &'static str {
    match level {
        QualityLevel::Low => "low",
        QualityLevel::Medium => "medium",
        QualityLevel::High => "high",
    }
}

fn resolution_label(resolution: &VideoResolution) -> String {
    match resolution.dimensions() {
        None => "Keep original".to_string(),
        Some((w, h)) => format!("{}p ({}x{})", h, w, h),
    }
}

/// Video and audio encoders that the container accepts
fn codecs_for(format: VideoFormat) -> (&'static str, &'static str) {
    match format {
        VideoFormat::Webm => ("libvpx-vp9", "libopus"),
        _ => ("libx264", "aac"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[derive(Debug)]
    enum Answer {
        Pick(usize),
        Text(&'static str),
        Flag(bool),
    }

    /// Replays answers in order and records the notes shown
    struct ScriptedPrompter {
        answers: RefCell<VecDeque<Answer>>,
        notes: RefCell<Vec<String>>,
    }

    impl ScriptedPrompter {
        fn new(answers: Vec<Answer>) -> Self {
            Self {
                answers: RefCell::new(answers.into()),
                notes: RefCell::new(Vec::new()),
            }
        }

        fn next(&self, prompt: &str) -> Answer {
            self.answers
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("no answer left for '{}'", prompt))
        }
    }

    impl Prompter for ScriptedPrompter {
        fn select(&self, prompt: &str, items: &[String], _default: usize) -> Result<usize> {
            match self.next(prompt) {
                Answer::Pick(index) => {
                    assert!(index < items.len(), "'{}' has {} items", prompt, items.len());
                    Ok(index)
                }
                other => panic!("expected a selection for '{}', got {:?}", prompt, other),
            }
        }

        fn input(&self, prompt: &str, _default: &str) -> Result<String> {
            match self.next(prompt) {
                Answer::Text(text) => Ok(text.to_string()),
                other => panic!("expected text for '{}', got {:?}", prompt, other),
            }
        }

        fn confirm(&self, prompt: &str, _default: bool) -> Result<bool> {
            match self.next(prompt) {
                Answer::Flag(yes) => Ok(yes),
                other => panic!("expected a confirmation for '{}', got {:?}", prompt, other),
            }
        }

        fn note(&self, message: &str) {
            self.notes.borrow_mut().push(message.to_string());
        }
    }

    fn media_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), vec![0u8; 2048]).unwrap();
        }
        dir
    }

    fn wizard(answers: Vec<Answer>) -> Wizard<ScriptedPrompter> {
        Wizard::new(ScriptedPrompter::new(answers))
    }

    fn remaining(wizard: &Wizard<ScriptedPrompter>) -> usize {
        wizard.prompter.answers.borrow().len()
    }

    #[test]
    fn test_quick_setup_builds_a_plan() {
        let input = media_dir(&["clip.mp4", "photo.jpg"]);
        let profiles_dir = tempfile::tempdir().unwrap();
        let profiles = ProfileManager::new(profiles_dir.path());

        use Answer::*;
        let wizard = wizard(vec![
            Pick(2), // quick setup
            Pick(0), // high
            Text("1"), // workers
            Flag(false), // overwrite
            Flag(true), // keep record
            Flag(false), // save as profile
            Flag(true), // start
        ]);

        let plan = wizard.run(input.path(), &profiles).unwrap().unwrap();
        assert_eq!(plan.profile.name, "quick-high");
        assert_eq!(plan.profile.video.quality_level, QualityLevel::High);
        assert_eq!(plan.profile.image.format, ImageFormat::Webp);
        assert_eq!(plan.options.kind_filter, KindFilter::All);
        assert!(plan.options.keep_record);
        assert!(!plan.options.overwrite);
        assert_eq!(plan.workers, 1);
        assert_eq!(remaining(&wizard), 0);

        let notes = wizard.prompter.notes.borrow();
        assert!(notes[0].starts_with("Found 1 videos"));
        assert!(profiles.list_custom_profiles().unwrap().is_empty());
    }

    #[test]
    fn test_custom_settings_reask_bad_numbers_and_save_profile() {
        let input = media_dir(&["clip.mov"]);
        let profiles_dir = tempfile::tempdir().unwrap();
        let profiles = ProfileManager::new(profiles_dir.path());

        use Answer::*;
        let wizard = wizard(vec![
            Pick(1), // custom settings; only videos, so no kind question
            Pick(3), // webm
            Pick(4), // 720p
            Pick(1), // advanced
            Text("70"), // out of range
            Text("abc"), // not a number
            Text("30"),
            Text("0"), // workers below range
            Text("1"),
            Flag(false), // overwrite
            Flag(false), // keep record
            Flag(true), // save as profile
            Text("web clips"), // invalid name
            Text("medium"), // reserved
            Text("web-clips"),
            Flag(true), // start
        ]);

        let plan = wizard.run(input.path(), &profiles).unwrap().unwrap();
        assert_eq!(plan.options.kind_filter, KindFilter::Video);
        assert_eq!(plan.profile.name, "web-clips");
        assert_eq!(plan.profile.video.format, VideoFormat::Webm);
        assert_eq!(plan.profile.video.resolution, VideoResolution::Hd720p);
        assert_eq!(plan.profile.video.crf, Some(30));
        assert_eq!(plan.profile.video.codec, "libvpx-vp9");
        assert_eq!(plan.profile.video.audio_codec, "libopus");
        assert_eq!(remaining(&wizard), 0);

        let saved = profiles.load_profile("web-clips").unwrap();
        assert_eq!(saved.video, plan.profile.video);
        assert_eq!(saved.resolve().unwrap().video.crf, 30);

        let notes = wizard.prompter.notes.borrow();
        assert_eq!(notes.iter().filter(|n| n.starts_with("Enter a whole number")).count(), 3);
        assert!(notes.iter().any(|n| n.contains("reserved")));
    }

    #[test]
    fn test_builtin_profile_and_declined_start() {
        let input = media_dir(&["a.jpg", "b.png"]);
        let profiles_dir = tempfile::tempdir().unwrap();
        let profiles = ProfileManager::new(profiles_dir.path());

        use Answer::*;
        let high = builtin_profile_names().iter().position(|n| *n == "high").unwrap();
        let wizard = wizard(vec![
            Pick(0), // saved or built-in profile
            Pick(high),
            Flag(false), // no modifications
            Text("1"),
            Flag(true), // overwrite
            Flag(false),
            Flag(false), // do not start
        ]);

        assert!(wizard.run(input.path(), &profiles).unwrap().is_none());
        assert_eq!(remaining(&wizard), 0);
    }

    #[test]
    fn test_modified_builtin_profile_is_renamed() {
        let input = media_dir(&["a.jpg"]);
        let profiles_dir = tempfile::tempdir().unwrap();
        let profiles = ProfileManager::new(profiles_dir.path());

        use Answer::*;
        let wizard = wizard(vec![
            Pick(0),
            Pick(0), // low
            Flag(true), // modify
            Flag(true), // image settings; no video files so no video question
            Pick(0), // jpeg
            Text("72"),
            Flag(false), // no resize
            Text("1"),
            Flag(false),
            Flag(false),
            Flag(false), // do not save
            Flag(true),
        ]);

        let plan = wizard.run(input.path(), &profiles).unwrap().unwrap();
        assert_eq!(plan.profile.name, "low-modified");
        assert_eq!(plan.profile.image.format, ImageFormat::Jpeg);
        assert_eq!(plan.profile.image.quality, Some(72));
        assert_eq!(plan.options.kind_filter, KindFilter::Image);
    }

    #[test]
    fn test_create_profile_for_images_only() {
        use Answer::*;
        let webp = ImageFormat::ALL.iter().position(|f| *f == ImageFormat::Webp).unwrap();
        let wizard = wizard(vec![
            Text("Small previews"),
            Pick(2), // images only
            Pick(webp),
            Text("101"), // out of range
            Text("70"),
            Flag(false), // lossy
            Flag(true), // resize
            Text("1280"),
            Text("0"),
        ]);

        let profile = wizard.create_profile("previews").unwrap();
        assert_eq!(profile.name, "previews");
        assert_eq!(profile.description, "Small previews");
        assert_eq!(profile.video, VideoSettings::default());
        assert_eq!(profile.image.format, ImageFormat::Webp);
        assert_eq!(profile.image.quality, Some(70));
        assert_eq!(profile.image.width, Some(1280));
        assert_eq!(profile.image.height, None);
        assert!(profile.resolve().is_ok());

        let profiles_dir = tempfile::tempdir().unwrap();
        let profiles = ProfileManager::new(profiles_dir.path());
        profiles.save_profile(&profile).unwrap();
        assert_eq!(profiles.list_custom_profiles().unwrap(), vec!["previews".to_string()]);
    }

    #[test]
    fn test_create_profile_rejects_reserved_name_before_prompting() {
        let wizard = wizard(vec![]);
        let err = wizard.create_profile("medium").unwrap_err();
        assert!(matches!(err, CompressifyError::Profile(_)));
    }

    #[test]
    fn test_input_without_media_is_rejected() {
        let input = media_dir(&["notes.txt"]);
        let profiles_dir = tempfile::tempdir().unwrap();
        let profiles = ProfileManager::new(profiles_dir.path());

        let err = wizard(vec![]).run(input.path(), &profiles).unwrap_err();
        assert!(matches!(err, CompressifyError::InvalidInput(_)));
    }

    #[test]
    fn test_resolution_labels() {
        assert_eq!(resolution_label(&VideoResolution::Original), "Keep original");
        assert_eq!(resolution_label(&VideoResolution::Hd720p), "720p (1280x720)");
    }
}
