//! XKB layout codes to language identifiers.

const LANG_NEUTRAL: u16 = 0x00;
const LANG_ARABIC: u16 = 0x01;
const LANG_BULGARIAN: u16 = 0x02;
const LANG_CHINESE: u16 = 0x04;
const LANG_CZECH: u16 = 0x05;
const LANG_DANISH: u16 = 0x06;
const LANG_GERMAN: u16 = 0x07;
const LANG_GREEK: u16 = 0x08;
const LANG_ENGLISH: u16 = 0x09;
const LANG_SPANISH: u16 = 0x0a;
const LANG_FINNISH: u16 = 0x0b;
const LANG_FRENCH: u16 = 0x0c;
const LANG_HEBREW: u16 = 0x0d;
const LANG_HUNGARIAN: u16 = 0x0e;
const LANG_ICELANDIC: u16 = 0x0f;
const LANG_ITALIAN: u16 = 0x10;
const LANG_JAPANESE: u16 = 0x11;
const LANG_KOREAN: u16 = 0x12;
const LANG_DUTCH: u16 = 0x13;
const LANG_NORWEGIAN: u16 = 0x14;
const LANG_POLISH: u16 = 0x15;
const LANG_PORTUGUESE: u16 = 0x16;
const LANG_ROMANIAN: u16 = 0x18;
const LANG_RUSSIAN: u16 = 0x19;
const LANG_CROATIAN: u16 = 0x1a;
const LANG_SERBIAN: u16 = 0x1a;
const LANG_BOSNIAN: u16 = 0x1a;
const LANG_SLOVAK: u16 = 0x1b;
const LANG_ALBANIAN: u16 = 0x1c;
const LANG_SWEDISH: u16 = 0x1d;
const LANG_THAI: u16 = 0x1e;
const LANG_TURKISH: u16 = 0x1f;
const LANG_URDU: u16 = 0x20;
const LANG_INDONESIAN: u16 = 0x21;
const LANG_UKRAINIAN: u16 = 0x22;
const LANG_BELARUSIAN: u16 = 0x23;
const LANG_SLOVENIAN: u16 = 0x24;
const LANG_ESTONIAN: u16 = 0x25;
const LANG_LATVIAN: u16 = 0x26;
const LANG_LITHUANIAN: u16 = 0x27;
const LANG_TAJIK: u16 = 0x28;
const LANG_PERSIAN: u16 = 0x29;
const LANG_VIETNAMESE: u16 = 0x2a;
const LANG_ARMENIAN: u16 = 0x2b;
const LANG_AZERBAIJANI: u16 = 0x2c;
const LANG_MACEDONIAN: u16 = 0x2f;
const LANG_TSWANA: u16 = 0x32;
const LANG_GEORGIAN: u16 = 0x37;
const LANG_FAEROESE: u16 = 0x38;
const LANG_HINDI: u16 = 0x39;
const LANG_MALTESE: u16 = 0x3a;
const LANG_MALAY: u16 = 0x3e;
const LANG_KAZAK: u16 = 0x3f;
const LANG_KYRGYZ: u16 = 0x40;
const LANG_SWAHILI: u16 = 0x41;
const LANG_TURKMEN: u16 = 0x42;
const LANG_UZBEK: u16 = 0x43;
const LANG_BANGLA: u16 = 0x45;
const LANG_MONGOLIAN: u16 = 0x50;
const LANG_TIBETAN: u16 = 0x51;
const LANG_KHMER: u16 = 0x53;
const LANG_LAO: u16 = 0x54;
const LANG_BURMESE: u16 = 0x55;
const LANG_SYRIAC: u16 = 0x5a;
const LANG_SINHALESE: u16 = 0x5b;
const LANG_AMHARIC: u16 = 0x5e;
const LANG_TAMAZIGHT: u16 = 0x5f;
const LANG_NEPALI: u16 = 0x61;
const LANG_FILIPINO: u16 = 0x64;
const LANG_DIVEHI: u16 = 0x65;
const LANG_MAORI: u16 = 0x81;
const LANG_WOLOF: u16 = 0x88;
const LANG_DARI: u16 = 0x8c;

const SUBLANG_DEFAULT: u16 = 0x01;
const SUBLANG_CUSTOM_DEFAULT: u16 = 0x03;
const SUBLANG_CUSTOM_UNSPECIFIED: u16 = 0x04;

pub const fn make_langid(primary: u16, sub: u16) -> u16 {
    (sub << 10) | primary
}

pub const fn primary_langid(lang: u16) -> u16 {
    lang & 0x3ff
}

pub const FRENCH: u16 = make_langid(LANG_FRENCH, SUBLANG_DEFAULT);
pub const GERMAN: u16 = make_langid(LANG_GERMAN, SUBLANG_DEFAULT);
pub const GERMAN_SWISS: u16 = make_langid(LANG_GERMAN, 0x02);
pub const ENGLISH_US: u16 = make_langid(LANG_ENGLISH, SUBLANG_DEFAULT);
pub const UNSPECIFIED: u16 = make_langid(LANG_NEUTRAL, SUBLANG_CUSTOM_UNSPECIFIED);

const TWO_LETTER: &[(&str, u16)] = &[
    ("af", make_langid(LANG_DARI, SUBLANG_DEFAULT)),
    ("al", make_langid(LANG_ALBANIAN, SUBLANG_DEFAULT)),
    ("am", make_langid(LANG_ARMENIAN, SUBLANG_DEFAULT)),
    ("at", make_langid(LANG_GERMAN, 0x03)),
    ("au", make_langid(LANG_ENGLISH, 0x03)),
    ("az", make_langid(LANG_AZERBAIJANI, SUBLANG_DEFAULT)),
    ("ba", make_langid(LANG_BOSNIAN, 0x08)),
    ("bd", make_langid(LANG_BANGLA, SUBLANG_DEFAULT)),
    ("be", make_langid(LANG_FRENCH, 0x02)),
    ("bg", make_langid(LANG_BULGARIAN, SUBLANG_DEFAULT)),
    ("br", make_langid(LANG_PORTUGUESE, 0x02)),
    ("bt", make_langid(LANG_TIBETAN, 0x03)),
    ("bw", make_langid(LANG_TSWANA, 0x02)),
    ("by", make_langid(LANG_BELARUSIAN, SUBLANG_DEFAULT)),
    ("ca", make_langid(LANG_ENGLISH, 0x04)),
    ("cd", make_langid(LANG_FRENCH, SUBLANG_CUSTOM_UNSPECIFIED)),
    ("ch", GERMAN_SWISS),
    ("cm", make_langid(LANG_FRENCH, 0x0b)),
    ("cn", make_langid(LANG_CHINESE, SUBLANG_DEFAULT)),
    ("cz", make_langid(LANG_CZECH, SUBLANG_DEFAULT)),
    ("de", GERMAN),
    ("dk", make_langid(LANG_DANISH, SUBLANG_DEFAULT)),
    ("dz", make_langid(LANG_TAMAZIGHT, 0x02)),
    ("ee", make_langid(LANG_ESTONIAN, SUBLANG_DEFAULT)),
    ("es", make_langid(LANG_SPANISH, SUBLANG_DEFAULT)),
    ("et", make_langid(LANG_AMHARIC, SUBLANG_DEFAULT)),
    ("fi", make_langid(LANG_FINNISH, SUBLANG_DEFAULT)),
    ("fo", make_langid(LANG_FAEROESE, SUBLANG_DEFAULT)),
    ("fr", FRENCH),
    ("gb", make_langid(LANG_ENGLISH, 0x02)),
    ("ge", make_langid(LANG_GEORGIAN, SUBLANG_DEFAULT)),
    ("gh", make_langid(LANG_ENGLISH, SUBLANG_CUSTOM_UNSPECIFIED)),
    ("gn", make_langid(LANG_NEUTRAL, SUBLANG_CUSTOM_DEFAULT)),
    ("gr", make_langid(LANG_GREEK, SUBLANG_DEFAULT)),
    ("hr", make_langid(LANG_CROATIAN, SUBLANG_DEFAULT)),
    ("hu", make_langid(LANG_HUNGARIAN, SUBLANG_DEFAULT)),
    ("id", make_langid(LANG_INDONESIAN, SUBLANG_DEFAULT)),
    ("ie", make_langid(LANG_ENGLISH, 0x06)),
    ("il", make_langid(LANG_HEBREW, SUBLANG_DEFAULT)),
    ("in", make_langid(LANG_HINDI, SUBLANG_DEFAULT)),
    ("iq", make_langid(LANG_ARABIC, 0x02)),
    ("ir", make_langid(LANG_PERSIAN, SUBLANG_DEFAULT)),
    ("is", make_langid(LANG_ICELANDIC, SUBLANG_DEFAULT)),
    ("it", make_langid(LANG_ITALIAN, SUBLANG_DEFAULT)),
    ("jp", make_langid(LANG_JAPANESE, SUBLANG_DEFAULT)),
    ("ke", make_langid(LANG_NEUTRAL, SUBLANG_CUSTOM_DEFAULT)),
    ("kg", make_langid(LANG_KYRGYZ, SUBLANG_DEFAULT)),
    ("kh", make_langid(LANG_KHMER, SUBLANG_DEFAULT)),
    ("kr", make_langid(LANG_KOREAN, SUBLANG_DEFAULT)),
    ("kz", make_langid(LANG_KAZAK, SUBLANG_DEFAULT)),
    ("la", make_langid(LANG_LAO, SUBLANG_DEFAULT)),
    ("lk", make_langid(LANG_SINHALESE, SUBLANG_DEFAULT)),
    ("lt", make_langid(LANG_LITHUANIAN, SUBLANG_DEFAULT)),
    ("lv", make_langid(LANG_LATVIAN, SUBLANG_DEFAULT)),
    ("ma", make_langid(LANG_ARABIC, 0x06)),
    ("md", make_langid(LANG_ROMANIAN, SUBLANG_CUSTOM_UNSPECIFIED)),
    ("me", make_langid(LANG_SERBIAN, 0x0b)),
    ("mk", make_langid(LANG_MACEDONIAN, SUBLANG_DEFAULT)),
    ("ml", make_langid(LANG_NEUTRAL, SUBLANG_CUSTOM_DEFAULT)),
    ("mm", make_langid(LANG_BURMESE, SUBLANG_DEFAULT)),
    ("mn", make_langid(LANG_MONGOLIAN, SUBLANG_DEFAULT)),
    ("mt", make_langid(LANG_MALTESE, SUBLANG_DEFAULT)),
    ("mv", make_langid(LANG_DIVEHI, SUBLANG_DEFAULT)),
    ("my", make_langid(LANG_MALAY, SUBLANG_DEFAULT)),
    ("ng", make_langid(LANG_ENGLISH, SUBLANG_CUSTOM_UNSPECIFIED)),
    ("nl", make_langid(LANG_DUTCH, SUBLANG_DEFAULT)),
    ("no", make_langid(LANG_NORWEGIAN, SUBLANG_DEFAULT)),
    ("np", make_langid(LANG_NEPALI, SUBLANG_DEFAULT)),
    ("ph", make_langid(LANG_FILIPINO, SUBLANG_DEFAULT)),
    ("pk", make_langid(LANG_URDU, SUBLANG_DEFAULT)),
    ("pl", make_langid(LANG_POLISH, SUBLANG_DEFAULT)),
    ("pt", make_langid(LANG_PORTUGUESE, SUBLANG_DEFAULT)),
    ("ro", make_langid(LANG_ROMANIAN, SUBLANG_DEFAULT)),
    ("rs", make_langid(LANG_SERBIAN, 0x02)),
    ("ru", make_langid(LANG_RUSSIAN, SUBLANG_DEFAULT)),
    ("se", make_langid(LANG_SWEDISH, SUBLANG_DEFAULT)),
    ("si", make_langid(LANG_SLOVENIAN, SUBLANG_DEFAULT)),
    ("sk", make_langid(LANG_SLOVAK, SUBLANG_DEFAULT)),
    ("sn", make_langid(LANG_WOLOF, SUBLANG_DEFAULT)),
    ("sy", make_langid(LANG_SYRIAC, SUBLANG_DEFAULT)),
    ("tg", make_langid(LANG_FRENCH, SUBLANG_CUSTOM_UNSPECIFIED)),
    ("th", make_langid(LANG_THAI, SUBLANG_DEFAULT)),
    ("tj", make_langid(LANG_TAJIK, SUBLANG_DEFAULT)),
    ("tm", make_langid(LANG_TURKMEN, SUBLANG_DEFAULT)),
    ("tr", make_langid(LANG_TURKISH, SUBLANG_DEFAULT)),
    ("tw", make_langid(LANG_CHINESE, SUBLANG_CUSTOM_UNSPECIFIED)),
    ("tz", make_langid(LANG_SWAHILI, SUBLANG_CUSTOM_UNSPECIFIED)),
    ("ua", make_langid(LANG_UKRAINIAN, SUBLANG_DEFAULT)),
    ("us", ENGLISH_US),
    ("uz", make_langid(LANG_UZBEK, 0x02)),
    ("vn", make_langid(LANG_VIETNAMESE, SUBLANG_DEFAULT)),
    ("za", make_langid(LANG_ENGLISH, 0x07)),
];

/// Language identifier for an XKB layout code such as `"fr"` or `"latam"`.
///
/// Unknown codes fall back to the neutral/custom-unspecified identifier.
pub fn langid_from_layout(code: &str) -> u16 {
    if code.len() == 2 {
        if let Some((_, lang)) = TWO_LETTER.iter().find(|(c, _)| *c == code) {
            return *lang;
        }
    }
    match code {
        "ara" => make_langid(LANG_ARABIC, SUBLANG_DEFAULT),
        "epo" => make_langid(LANG_NEUTRAL, SUBLANG_CUSTOM_DEFAULT),
        "mao" => make_langid(LANG_MAORI, SUBLANG_DEFAULT),
        "brai" => make_langid(LANG_NEUTRAL, SUBLANG_CUSTOM_DEFAULT),
        "latam" => make_langid(LANG_SPANISH, SUBLANG_CUSTOM_UNSPECIFIED),
        _ => {
            tracing::warn!(layout = code, "unknown layout language");
            UNSPECIFIED
        }
    }
}

/// Descriptive XKB group names, most specific first.
const DESCRIPTIONS: &[(&str, &str)] = &[
    ("English (US)", "us"),
    ("English (UK)", "gb"),
    ("English (Canada)", "ca"),
    ("English (Australia)", "au"),
    ("English (South Africa)", "za"),
    ("English", "us"),
    ("French (Switzerland)", "ch"),
    ("French (Canada)", "ca"),
    ("French (Belgium)", "be"),
    ("French", "fr"),
    ("German (Switzerland)", "ch"),
    ("German (Austria)", "at"),
    ("German", "de"),
    ("Portuguese (Brazil)", "br"),
    ("Portuguese", "pt"),
    ("Spanish (Latin American)", "latam"),
    ("Spanish", "es"),
    ("Italian", "it"),
    ("Dutch", "nl"),
    ("Belgian", "be"),
    ("Swedish", "se"),
    ("Norwegian", "no"),
    ("Danish", "dk"),
    ("Finnish", "fi"),
    ("Icelandic", "is"),
    ("Polish", "pl"),
    ("Czech", "cz"),
    ("Slovak", "sk"),
    ("Hungarian", "hu"),
    ("Romanian", "ro"),
    ("Russian", "ru"),
    ("Ukrainian", "ua"),
    ("Greek", "gr"),
    ("Turkish", "tr"),
    ("Hebrew", "il"),
    ("Arabic", "ara"),
    ("Persian", "ir"),
    ("Japanese", "jp"),
    ("Korean", "kr"),
    ("Chinese", "cn"),
    ("Thai", "th"),
    ("Vietnamese", "vn"),
    ("Esperanto", "epo"),
];

/// Layout code for a descriptive group name like `"French (AZERTY)"`.
pub fn code_from_description(description: &str) -> Option<&'static str> {
    DESCRIPTIONS
        .iter()
        .find(|(prefix, _)| description.starts_with(prefix))
        .map(|(_, code)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_letter_codes() {
        assert_eq!(langid_from_layout("us"), 0x0409);
        assert_eq!(langid_from_layout("fr"), 0x040c);
        assert_eq!(langid_from_layout("de"), 0x0407);
        assert_eq!(langid_from_layout("ch"), 0x0807);
        assert_eq!(langid_from_layout("gb"), 0x0809);
        assert_eq!(langid_from_layout("br"), 0x0816);
    }

    #[test]
    fn longer_codes() {
        assert_eq!(langid_from_layout("ara"), 0x0401);
        assert_eq!(langid_from_layout("latam"), 0x100a);
        assert_eq!(langid_from_layout("epo"), 0x0c00);
        assert_eq!(langid_from_layout("mao"), 0x0481);
    }

    #[test]
    fn unknown_codes_are_unspecified() {
        assert_eq!(langid_from_layout("xx"), UNSPECIFIED);
        assert_eq!(langid_from_layout("custom"), UNSPECIFIED);
        assert_eq!(langid_from_layout(""), UNSPECIFIED);
    }

    #[test]
    fn table_has_no_duplicate_codes() {
        let mut codes: Vec<&str> = TWO_LETTER.iter().map(|(c, _)| *c).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), TWO_LETTER.len());
    }

    #[test]
    fn descriptions_map_to_codes() {
        assert_eq!(code_from_description("English (US)"), Some("us"));
        assert_eq!(code_from_description("French (AZERTY)"), Some("fr"));
        assert_eq!(code_from_description("German (Switzerland)"), Some("ch"));
        assert_eq!(code_from_description("German (no dead keys)"), Some("de"));
        assert_eq!(code_from_description("Klingon"), None);
    }
}
