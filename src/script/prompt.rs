//! Instruction templates for script generation

use std::fmt::Write as FmtWrite;

use crate::job::VideoStyle;

use super::ScriptRequest;

const PREFIX: &str = "You are a master content creator specializing in engaging Bible content \
for short-form social video. Create theologically accurate scripts that hook viewers \
immediately and deliver profound truth in a digestible format.

CRITICAL REQUIREMENTS:
- Hook viewers in the first 3 seconds with a compelling question or statement
- Use conversational, modern language
- Include strategic pauses and emphasis points
- End with a memorable takeaway or call to action
- Stay biblically accurate while being culturally relevant
- Use emojis sparingly

Return ONLY a JSON object with these fields:
\"script\" (string, 30-1000 characters), \"hook\" (string, at most 100 characters),
\"callToAction\" (string, at most 80 characters),
\"keyMoments\" (array of {\"timestamp\": seconds, \"text\": phrase quoted from the script, \"emphasis\": bool}),
\"keywords\" (1-10 visual search keywords), \"estimatedDuration\" (seconds, 15-120),
\"emotionalTone\" (one of inspirational, dramatic, peaceful, energetic, contemplative),
\"visual\" ({\"mood\": string, \"colorPalette\": [\"#RRGGBB\", ...], \"motion\": slow|medium|fast|static}).
No markdown.";

struct Example {
    topic: &'static str,
    style: &'static str,
    duration: u32,
    theme: &'static str,
    output: &'static str,
}

const EXAMPLES: [Example; 2] = [
    Example {
        topic: "John 3:16",
        style: "tiktok",
        duration: 45,
        theme: "God's Love",
        output: r##"{"script":"Wait... did you know there's ONE verse that changed EVERYTHING? John 3:16 says God loved the world SO much that He gave His only Son. Think about that. The Creator of the universe loves YOU that much. That's not just love, that's RADICAL love. So the next time you doubt your worth, remember this: you are Heaven's treasured possession.","keyMoments":[{"timestamp":2,"text":"ONE verse that changed EVERYTHING","emphasis":true},{"timestamp":15,"text":"God loved the world SO much","emphasis":true},{"timestamp":35,"text":"you are Heaven's treasured possession","emphasis":true}],"estimatedDuration":43,"hook":"Wait... did you know there's ONE verse that changed EVERYTHING?","callToAction":"Remember: you are Heaven's treasured possession","keywords":["love","heart","light","heaven","embrace"],"emotionalTone":"inspirational","visual":{"mood":"warm sunrise","colorPalette":["#FFD700","#FF6B6B"],"motion":"slow"}}"##,
    },
    Example {
        topic: "Philippians 4:13",
        style: "instagram_reel",
        duration: 60,
        theme: "Strength",
        output: r##"{"script":"Feeling weak? Overwhelmed? Like you can't handle what's ahead? Here's what Paul discovered in prison: literal chains couldn't chain his spirit. Philippians 4:13 says I can do all things through Christ who strengthens me. Not some things. ALL things. That job interview? You've got this. That mountain you're facing? You've got divine strength flowing through you right now. You're not fighting alone. You're fighting with Heaven's power.","keyMoments":[{"timestamp":8,"text":"literal chains couldn't chain his spirit","emphasis":true},{"timestamp":25,"text":"ALL things","emphasis":true},{"timestamp":50,"text":"You're fighting with Heaven's power","emphasis":true}],"estimatedDuration":58,"hook":"Feeling weak? Overwhelmed? Like you can't handle what's ahead?","callToAction":"You're fighting with Heaven's power","keywords":["strength","power","victory","mountain","breakthrough"],"emotionalTone":"energetic","visual":{"mood":"bold mountain dawn","colorPalette":["#FF6B35","#F7931E"],"motion":"fast"}}"##,
    },
];

/// Words that fit `duration_secs` of natural narration
#[must_use]
pub fn word_target(duration_secs: u32) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let words = (f64::from(duration_secs) * 2.5).round() as u32;
    words
}

/// Style-specific instruction block
#[must_use]
pub fn style_block(style: VideoStyle, duration_secs: u32) -> String {
    match style {
        VideoStyle::Tiktok => format!(
            "Write a TikTok-style script that:\n\
             - Starts with a hook in the first 3 seconds\n\
             - Uses modern, conversational language\n\
             - Includes dramatic pauses and emphasis\n\
             - Ends with a powerful takeaway\n\
             - Is exactly {duration_secs} seconds when read aloud (about {} words)\n\
             - Uses \"you\" to directly address the viewer",
            word_target(duration_secs)
        ),
        VideoStyle::InstagramReel => format!(
            "Write an Instagram Reel script that:\n\
             - Has a compelling opening line\n\
             - Uses storytelling techniques\n\
             - Includes visual cues for text overlays\n\
             - Has a clear message or lesson\n\
             - Is {duration_secs} seconds when narrated (about {} words)",
            word_target(duration_secs)
        ),
        VideoStyle::YoutubeShort => format!(
            "Write a YouTube Short script that:\n\
             - Grabs attention immediately\n\
             - Has educational value\n\
             - Uses cliffhangers and reveals\n\
             - Encourages engagement\n\
             - Fits {duration_secs} seconds of narration (about {} words)",
            word_target(duration_secs)
        ),
    }
}

/// System turn: prefix, style block and the few-shot examples
#[must_use]
pub fn system_prompt(request: &ScriptRequest) -> String {
    let mut out = String::from(PREFIX);
    out.push_str("\n\n");
    out.push_str(&style_block(request.style, request.duration_secs));
    out.push_str("\n\nExamples:\n");
    for example in &EXAMPLES {
        // Writing to a String cannot fail
        let _ = write!(
            out,
            "\nTopic: {}\nStyle: {}\nDuration: {}s\nTheme: {}\nOutput: {}\n",
            example.topic, example.style, example.duration, example.theme, example.output
        );
    }
    out
}

/// User turn with the job's parameters
#[must_use]
pub fn user_prompt(request: &ScriptRequest) -> String {
    let mut out = format!(
        "Topic: {}\nStyle: {}\nDuration: {}s\nTheme: {}",
        request.topic,
        request.style.as_str(),
        request.duration_secs,
        request.theme.as_deref().unwrap_or("none")
    );
    if let Some(custom) = &request.custom_prompt {
        let _ = write!(out, "\nCustom requirements: {custom}");
    }
    if let Some(genre) = &request.audio_genre {
        let _ = write!(out, "\nMusic mood: {genre}");
    }
    out.push_str("\n\nGenerate an engaging script that will captivate viewers:");
    out
}

/// Repair turn for a payload that failed validation
#[must_use]
pub fn repair_prompt(completion: &str, error: &str) -> String {
    format!(
        "The following JSON output has formatting issues. Fix it to match the required schema.\n\n\
         Original output: {completion}\n\
         Error: {error}\n\n\
         Return only the corrected JSON:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobParams;

    #[test]
    fn word_target_rounds() {
        assert_eq!(word_target(45), 113);
        assert_eq!(word_target(60), 150);
        assert_eq!(word_target(15), 38);
    }

    #[test]
    fn each_style_has_its_own_block() {
        assert!(style_block(VideoStyle::Tiktok, 30).contains("TikTok"));
        assert!(style_block(VideoStyle::InstagramReel, 30).contains("Instagram Reel"));
        assert!(style_block(VideoStyle::YoutubeShort, 30).contains("YouTube Short"));
        assert!(style_block(VideoStyle::Tiktok, 30).contains("about 75 words"));
    }

    #[test]
    fn examples_are_valid_payloads() {
        for example in &EXAMPLES {
            let script = super::super::parse_script(example.output).unwrap();
            assert!(super::super::validate(&script, example.duration).is_ok());
        }
    }

    #[test]
    fn system_prompt_embeds_examples() {
        let request = ScriptRequest::from(&JobParams::new("Psalm 23:1", 45));
        let system = system_prompt(&request);
        assert!(system.contains("CRITICAL REQUIREMENTS"));
        assert!(system.contains("Topic: John 3:16"));
        assert!(system.contains("Topic: Philippians 4:13"));
    }

    #[test]
    fn user_prompt_lists_optional_fields() {
        let mut params = JobParams::new("Psalm 23:1", 45).with_theme("Rest");
        params.custom_prompt = Some("mention sheep".into());
        let user = user_prompt(&ScriptRequest::from(&params));
        assert!(user.contains("Topic: Psalm 23:1"));
        assert!(user.contains("Theme: Rest"));
        assert!(user.contains("Custom requirements: mention sheep"));
        assert!(!user.contains("Music mood"));
    }

    #[test]
    fn repair_prompt_carries_payload_and_error() {
        let prompt = repair_prompt("{bad", "missing field `script`");
        assert!(prompt.contains("Original output: {bad"));
        assert!(prompt.contains("Error: missing field `script`"));
    }
}
